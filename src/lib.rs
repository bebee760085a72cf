//! Cross-platform named shared-memory magic ring buffers.
//!
//! A magic ring buffer maps its backing storage twice in virtual memory —
//! a primary view and a mirror immediately following it — so that any
//! window of length `<= capacity` reads as a contiguous slice regardless of
//! wraparound. [`ring::Ring`] is the single-type version (C3);
//! [`define_multi_ring!`] builds a struct-of-arrays variant (C4) over
//! several parallel rings sharing one synchronized element count.
//!
//! See `SPEC_FULL.md` for the full design; `DESIGN.md` for what each module
//! is grounded on.
#![cfg_attr(not(any(unix, windows)), allow(dead_code))]

pub mod config_shape;
pub mod error;
pub mod layout;
pub mod mapper;
pub mod multi_ring;
mod platform;
pub mod ring;
pub mod state;

pub use config_shape::ConfigShape;
pub use error::{MapError, MapResult, RingError, RingResult};
pub use layout::{Layout, PlatformLimits};
pub use mapper::{get_mapper, register_mapper, Access, Mapping, PlatformMapper};
pub use ring::Ring;
pub use state::RingStats;
