//! OS / scheduling facade (spec.md §1/§5/§6 treat task creation and
//! millisecond delay as an external scheduling facility).
//!
//! This module exposes the minimal trait seam the reactor's idle tick needs;
//! it does not implement a real RTOS binding — wiring a concrete scheduler is
//! the embedding application's job, same as wiring a concrete
//! [`crate::transport::Transport`].

/// A millisecond delay primitive, used by the reactor's no-work tick and by
/// [`crate::client::Client::conn_close`]'s wait loop so it backs off instead
/// of busy-spinning.
pub trait Delay {
    fn delay_ms(ms: u32);
}

#[cfg(feature = "std")]
mod std_impl {
    use std::time::Duration;

    /// `std::thread::sleep`-backed delay, used by
    /// [`crate::client::Client::run_background`] and the integration tests.
    pub struct StdDelay;

    impl super::Delay for StdDelay {
        fn delay_ms(ms: u32) {
            std::thread::sleep(Duration::from_millis(ms as u64));
        }
    }
}

#[cfg(feature = "std")]
pub use std_impl::StdDelay;
