pub mod fingerprint;

pub use fingerprint::{fingerprint_debug, fingerprint_json, Fingerprint, FingerprintBuilder};
