//! Blocking synchronization primitives for OS threads
//!
//! This crate provides synchronization primitives for code that runs on real,
//! preemptible threads rather than inside an async runtime.
//!
//! # Primitives
//!
//! - [`Semaphore`] - Counting semaphore for bounding concurrent admission
//!
//! # Example
//!
//! ```rust,no_run
//! use hotplate_sync::Semaphore;
//! use std::thread;
//!
//! let sem = Semaphore::new(3);
//!
//! // Spawn many threads, but only 3 run the guarded region concurrently
//! let handles: Vec<_> = (0..7)
//!     .map(|i| {
//!         let sem = sem.clone();
//!         thread::spawn(move || {
//!             let _permit = sem.acquire();
//!             println!("Thread {}", i);
//!         })
//!     })
//!     .collect();
//!
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//! ```

mod semaphore;

pub use semaphore::{Semaphore, SemaphorePermit};
