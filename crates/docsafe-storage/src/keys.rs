//! Shared key generation and parsing for storage backends.
//!
//! Key formats:
//! - temporary: `temp/{tenant_id}/{document_id}`
//! - permanent: `{tenant_id}/{folder_id}/{document_id}/{version_id}`
//! - quarantine: `quarantine/{tenant_id}/{document_id}`
//!
//! The prefixes are part of a compatibility contract with other services and
//! must not change. Because the area is resolved from the first segment,
//! `temp` and `quarantine` are reserved and cannot be used as tenant ids.

use std::fmt::{Display, Formatter, Result as FmtResult};

use docsafe_core::validation::{validate_identifier, validate_storage_path};
use docsafe_core::AppError;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

pub const TEMP_PREFIX: &str = "temp";
pub const QUARANTINE_PREFIX: &str = "quarantine";

/// Characters left as-is in the RFC 5987 `filename*` parameter.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// One of the three storage areas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketClass {
    Temporary,
    Permanent,
    Quarantine,
}

impl Display for BucketClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            BucketClass::Temporary => write!(f, "temporary"),
            BucketClass::Permanent => write!(f, "permanent"),
            BucketClass::Quarantine => write!(f, "quarantine"),
        }
    }
}

/// A storage path split into its area and embedded tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey<'a> {
    pub class: BucketClass,
    pub tenant_id: &'a str,
    pub document_id: &'a str,
}

/// Validate a tenant id, including the reserved area prefixes.
pub fn validate_tenant_id(tenant_id: &str) -> Result<(), AppError> {
    validate_identifier("tenant_id", tenant_id)?;
    if tenant_id == TEMP_PREFIX || tenant_id == QUARANTINE_PREFIX {
        return Err(AppError::Validation(format!(
            "tenant_id {:?} is reserved",
            tenant_id
        )));
    }
    Ok(())
}

pub fn temporary_key(tenant_id: &str, document_id: &str) -> String {
    format!("{}/{}/{}", TEMP_PREFIX, tenant_id, document_id)
}

pub fn permanent_key(tenant_id: &str, folder_id: &str, document_id: &str, version_id: &str) -> String {
    format!("{}/{}/{}/{}", tenant_id, folder_id, document_id, version_id)
}

pub fn quarantine_key(tenant_id: &str, document_id: &str) -> String {
    format!("{}/{}/{}", QUARANTINE_PREFIX, tenant_id, document_id)
}

/// Resolve the area and tenant of a storage path.
///
/// Paths that do not have exactly the segment count of their area are
/// rejected as validation errors.
pub fn parse_storage_path(path: &str) -> Result<ParsedKey<'_>, AppError> {
    validate_storage_path(path)?;

    let segments: Vec<&str> = path.split('/').collect();
    let parsed = match segments[..] {
        [prefix, tenant_id, document_id] if prefix == TEMP_PREFIX => ParsedKey {
            class: BucketClass::Temporary,
            tenant_id,
            document_id,
        },
        [prefix, tenant_id, document_id] if prefix == QUARANTINE_PREFIX => ParsedKey {
            class: BucketClass::Quarantine,
            tenant_id,
            document_id,
        },
        [prefix, ..] if prefix == TEMP_PREFIX || prefix == QUARANTINE_PREFIX => {
            return Err(AppError::Validation(format!(
                "malformed {} storage path: {}",
                prefix, path
            )));
        }
        [tenant_id, _folder_id, document_id, _version_id] => ParsedKey {
            class: BucketClass::Permanent,
            tenant_id,
            document_id,
        },
        _ => {
            return Err(AppError::Validation(format!(
                "unrecognized storage path: {}",
                path
            )));
        }
    };

    Ok(parsed)
}

/// `Content-Disposition` value forcing a download under `filename`.
///
/// The quoted `filename` parameter is an ASCII fallback; the exact name is
/// carried in the RFC 5987 `filename*` parameter.
pub fn attachment_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let encoded = utf8_percent_encode(filename, ATTR_CHAR).to_string();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback, encoded
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layouts() {
        assert_eq!(temporary_key("t1", "d1"), "temp/t1/d1");
        assert_eq!(permanent_key("t1", "f1", "d1", "v1"), "t1/f1/d1/v1");
        assert_eq!(quarantine_key("t1", "d1"), "quarantine/t1/d1");
    }

    #[test]
    fn test_parse_resolves_area_from_prefix() {
        let temp = parse_storage_path("temp/t1/d1").unwrap();
        assert_eq!(temp.class, BucketClass::Temporary);
        assert_eq!(temp.tenant_id, "t1");
        assert_eq!(temp.document_id, "d1");

        let quarantine = parse_storage_path("quarantine/t1/d1").unwrap();
        assert_eq!(quarantine.class, BucketClass::Quarantine);

        let permanent = parse_storage_path("t1/f1/d1/v1").unwrap();
        assert_eq!(permanent.class, BucketClass::Permanent);
        assert_eq!(permanent.tenant_id, "t1");
        assert_eq!(permanent.document_id, "d1");
    }

    #[test]
    fn test_parse_rejects_malformed_paths() {
        assert!(parse_storage_path("temp/t1").is_err());
        assert!(parse_storage_path("temp/t1/d1/extra").is_err());
        assert!(parse_storage_path("quarantine/t1/d1/v1").is_err());
        assert!(parse_storage_path("t1/d1").is_err());
        assert!(parse_storage_path("../t1/f1/d1").is_err());
        assert!(parse_storage_path("").is_err());
    }

    #[test]
    fn test_reserved_tenant_ids() {
        assert!(validate_tenant_id("t1").is_ok());
        assert!(validate_tenant_id("temp").is_err());
        assert!(validate_tenant_id("quarantine").is_err());
        assert!(validate_tenant_id("").is_err());
    }

    #[test]
    fn test_attachment_disposition() {
        assert_eq!(
            attachment_disposition("report.pdf"),
            "attachment; filename=\"report.pdf\"; filename*=UTF-8''report.pdf"
        );
        let value = attachment_disposition("r\u{e9}sum\u{e9} \"v2\".pdf");
        assert!(value.starts_with("attachment; filename=\"r_sum_ _v2_.pdf\""));
        assert!(value.contains("filename*=UTF-8''r%C3%A9sum%C3%A9%20%22v2%22.pdf"));
    }
}
