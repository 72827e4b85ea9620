//! Integration tests for the tick sampling harness.
//!
//! All tests here use real threads and real sleeps, scaled down from the
//! default configuration (seconds become tens of milliseconds) so a full
//! run stays under a few seconds. Assertions use generous tolerances where a
//! loaded machine could stretch an interval; the anchored firing schedule
//! keeps mean periods tight even then.

mod common;

mod autonomy_test;
mod config_test;
mod sequencing_test;
mod skew_test;
