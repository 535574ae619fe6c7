#![cfg(feature = "net")]

use super::{CertificateError, NetError};
use log::debug;
use rustls::{ClientConfig, RootCertStore};
use rustls_pemfile::certs;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use std::path::Path;
use std::sync::Arc;

/// CA roots trusted when talking to the cluster API server.
#[derive(Clone)]
pub struct TlsTrustStore {
    pub roots: RootCertStore,
}

impl TlsTrustStore {
    /// Client configuration that verifies the server against these roots and
    /// presents no client certificate.
    pub fn client_config(&self) -> Arc<ClientConfig> {
        Arc::new(
            ClientConfig::builder()
                .with_safe_defaults()
                .with_root_certificates(self.roots.clone())
                .with_no_client_auth(),
        )
    }
}

pub fn load_trust_store_from_pem(path: impl AsRef<Path>) -> Result<TlsTrustStore, NetError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|err| {
        debug!(
            "event=trust_bundle_open_failed path={} error={err}",
            path.display()
        );
        NetError::from(err)
    })?;
    parse_bundle(&mut BufReader::new(file))
}

pub fn load_trust_store_from_pem_bytes(pem: &[u8]) -> Result<TlsTrustStore, NetError> {
    parse_bundle(&mut Cursor::new(pem))
}

fn parse_bundle(reader: &mut dyn BufRead) -> Result<TlsTrustStore, NetError> {
    let raw = certs(reader).map_err(|_| CertificateError::TrustBundleRead)?;
    if raw.is_empty() {
        return Err(NetError::from(CertificateError::TrustBundleEmpty));
    }
    let mut store = RootCertStore::empty();
    let (added, skipped) = store.add_parsable_certificates(&raw);
    if added == 0 {
        return Err(NetError::from(CertificateError::TrustBundleUnparsable));
    }
    if skipped > 0 {
        debug!("event=trust_bundle_loaded added={added} skipped={skipped}");
    }
    Ok(TlsTrustStore { roots: store })
}
