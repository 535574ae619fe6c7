#![cfg(feature = "net")]

mod handshake;
mod trust;

pub use handshake::{complete_client_handshake, server_name};
pub use trust::{load_trust_store_from_pem, load_trust_store_from_pem_bytes, TlsTrustStore};

use super::{CertificateError, NetError};
