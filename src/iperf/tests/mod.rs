//! Whole-transcript tests for the iperf3 output pipeline
//!
//! Unit tests of the individual rules live next to them; these feed complete
//! captured runs through decoding and classification.
