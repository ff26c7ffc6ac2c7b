use x509_parser::pem::Pem;

use crate::constants::TRUSTED_CA_BUNDLE_CONFIGMAP_KEY;
use crate::models::{ConfigMap, ObjectKey};

// ============================================================================
// Trust Bundle Validation
// ============================================================================
//
// A trust bundle is accepted only if the designated key holds one or more PEM
// blocks, every block is a CERTIFICATE, and every certificate parses as
// X.509. Anything else is rejected before it can reach a single target.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("config map {0} has no 'ca-bundle.crt' entry")]
    MissingKey(ObjectKey),

    #[error("'ca-bundle.crt' in config map {0} is empty")]
    Empty(ObjectKey),

    #[error("malformed PEM block #{index}: {reason}")]
    MalformedPem { index: usize, reason: String },

    #[error("PEM block #{index} is a {label}, expected CERTIFICATE")]
    UnexpectedBlock { index: usize, label: String },

    #[error("certificate #{index} does not parse: {reason}")]
    InvalidCertificate { index: usize, reason: String },

    #[error("data does not contain any certificates")]
    NoCertificates,
}

/// A validated bundle, ready to be propagated verbatim
#[derive(Debug, Clone, PartialEq)]
pub struct TrustBundle {
    pub source: ObjectKey,
    pub certificate_count: usize,
    pub data: String,
}

/// Validate the trusted CA bundle held by `cm`
pub fn trust_bundle_config_map(cm: &ConfigMap) -> Result<TrustBundle, ValidationError> {
    let data = cm
        .data
        .get(TRUSTED_CA_BUNDLE_CONFIGMAP_KEY)
        .ok_or_else(|| ValidationError::MissingKey(cm.key()))?;

    if data.trim().is_empty() {
        return Err(ValidationError::Empty(cm.key()));
    }

    let certificate_count = validate_pem_certificates(data.as_bytes())?;

    Ok(TrustBundle {
        source: cm.key(),
        certificate_count,
        data: data.clone(),
    })
}

/// Returns the number of certificates in `data`
pub fn validate_pem_certificates(data: &[u8]) -> Result<usize, ValidationError> {
    let mut count = 0;

    for (index, block) in Pem::iter_from_buffer(data).enumerate() {
        let block = block.map_err(|e| ValidationError::MalformedPem {
            index,
            reason: e.to_string(),
        })?;

        if block.label != "CERTIFICATE" {
            return Err(ValidationError::UnexpectedBlock {
                index,
                label: block.label,
            });
        }

        block
            .parse_x509()
            .map_err(|e| ValidationError::InvalidCertificate {
                index,
                reason: e.to_string(),
            })?;

        count += 1;
    }

    if count == 0 {
        return Err(ValidationError::NoCertificates);
    }

    Ok(count)
}
