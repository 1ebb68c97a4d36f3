//! Logging facade for the sift pipeline.
//!
//! # Setup
//!
//! To enable logging, invoke the [`init`] function with a [`LogConfig`]. The
//! configuration implements `serde` traits, so it can be embedded in a larger
//! configuration file.
//!
//! ```
//! # #[cfg(feature = "init")] {
//! let config = sift_log::LogConfig::default();
//! sift_log::init(&config);
//! # }
//! ```
//!
//! # Logging
//!
//! Logging happens through the five macros re-exported from `tracing`:
//! [`error!`], [`warn!`], [`info!`], [`debug!`] and [`trace!`].
//!
//! ## Conventions
//!
//! Log messages should start lowercase and end without punctuation. Prefer
//! short and precise log messages over verbose text. Choose the log level
//! according to these rules:
//!
//! - [`error!`] for bugs and invalid behavior.
//! - [`warn!`] for undesirable behavior.
//! - [`info!`] for messages relevant to the average operator.
//! - [`debug!`] for messages usually relevant to debugging.
//! - [`trace!`] for full auxiliary information.
//!
//! # Testing
//!
//! For unit testing, there is a separate initialization macro [`init_test!`]
//! that should be called at the beginning of the test. It routes logs to the
//! output captured by the test runner and only enables logs from the calling
//! crate.
//!
//! ```ignore
//! #[test]
//! fn test_something() {
//!     sift_log::init_test!();
//! }
//! ```

#![warn(missing_docs)]

#[cfg(feature = "init")]
mod setup;
#[cfg(feature = "init")]
pub use setup::*;

#[cfg(feature = "test")]
mod test;
#[cfg(feature = "test")]
pub use test::*;

// Expose the minimal tracing facade.
#[doc(inline)]
pub use tracing::{debug, error, info, trace, warn};
