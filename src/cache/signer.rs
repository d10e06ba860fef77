//! AK/SK request signing (`SDK-HMAC-SHA256`)

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Url;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

pub(crate) const ALGORITHM: &str = "SDK-HMAC-SHA256";
pub(crate) const DATE_HEADER: &str = "X-Sdk-Date";
const SIGNED_HEADERS: &str = "host;x-sdk-date";

type HmacSha256 = Hmac<Sha256>;

/// Headers to attach to a signed request
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Signature {
    pub sdk_date: String,
    pub authorization: String,
}

pub(crate) struct Signer<'a> {
    access_key: &'a str,
    secret_key: &'a [u8],
}

impl<'a> Signer<'a> {
    pub fn new(access_key: &'a str, secret_key: &'a [u8]) -> Self {
        Self {
            access_key,
            secret_key,
        }
    }

    pub fn sign(&self, method: &str, url: &Url, body: &[u8], now: DateTime<Utc>) -> Result<Signature> {
        let sdk_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let canonical = canonical_request(method, url, body, &sdk_date)?;
        let string_to_sign = format!(
            "{}\n{}\n{}",
            ALGORITHM,
            sdk_date,
            hex::encode(Sha256::digest(canonical.as_bytes()))
        );

        let mut mac = HmacSha256::new_from_slice(self.secret_key)
            .map_err(|_| Error::InvalidCredential("sk"))?;
        mac.update(string_to_sign.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(Signature {
            authorization: format!(
                "{} Access={}, SignedHeaders={}, Signature={}",
                ALGORITHM, self.access_key, SIGNED_HEADERS, signature
            ),
            sdk_date,
        })
    }
}

fn canonical_request(method: &str, url: &Url, body: &[u8], sdk_date: &str) -> Result<String> {
    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        (None, _) => {
            return Err(Error::ConfigError(format!("locator URL {} has no host", url)));
        }
    };

    let mut path = url.path().to_string();
    if !path.ends_with('/') {
        path.push('/');
    }

    let mut query: Vec<&str> = url
        .query()
        .map(|q| q.split('&').filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();
    query.sort_unstable();

    Ok(format!(
        "{}\n{}\n{}\nhost:{}\nx-sdk-date:{}\n\n{}\n{}",
        method,
        path,
        query.join("&"),
        host,
        sdk_date,
        SIGNED_HEADERS,
        hex::encode(Sha256::digest(body))
    ))
}
