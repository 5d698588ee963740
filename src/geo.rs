//! Guess the caller's country from their public IP address.
//!
//! Two HTTP lookups: the public IP from an IP echo service, then the country
//! code for that IP from a GeoIP service. Any failure just means "country
//! unknown" and the caller falls back to asking the user.
use crate::error::{GensystemError, Result};
use crate::mirrors::MirrorDirectory;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, warn};

/// GeoIP codes that differ from the names used in the mirror directory.
const CODE_DISCREPANCIES: &[(&str, &str)] = &[("US", "USA"), ("GB", "UK")];

#[derive(Debug, Deserialize)]
struct PublicIp {
    ip: IpAddr,
}

/// Maps a GeoIP country code to a mirror directory country name.
///
/// Returns `None` when the directory has no such country.
pub fn country_for_code<'d>(code: &str, directory: &'d MirrorDirectory) -> Option<&'d str> {
    let code = code.trim();
    let by_discrepancy = CODE_DISCREPANCIES
        .iter()
        .find(|(geoip, _)| geoip.eq_ignore_ascii_case(code))
        .and_then(|(_, name)| directory.country(name));

    by_discrepancy
        .or_else(|| directory.country_by_code(code))
        .map(|country| country.name.as_str())
}

pub struct GeoResolver {
    client: reqwest::Client,
    ip_lookup_url: String,
    geoip_url: String,
    timeout: Duration,
}

impl GeoResolver {
    /// `geoip_url` must contain an `{ip}` placeholder.
    pub fn new(
        client: reqwest::Client,
        ip_lookup_url: impl Into<String>,
        geoip_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            ip_lookup_url: ip_lookup_url.into(),
            geoip_url: geoip_url.into(),
            timeout,
        }
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        let failure = |reason: String| GensystemError::LookupFailure {
            url: url.to_string(),
            reason,
        };
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| failure(e.to_string()))?;
        if !response.status().is_success() {
            return Err(failure(format!("HTTP {}", response.status())));
        }
        response.text().await.map_err(|e| failure(e.to_string()))
    }

    /// Asks the IP echo service for our public address.
    pub async fn public_ip(&self) -> Result<IpAddr> {
        let body = self.fetch_text(&self.ip_lookup_url).await?;
        serde_json::from_str::<PublicIp>(&body)
            .map(|answer| answer.ip)
            .map_err(|e| GensystemError::LookupFailure {
                url: self.ip_lookup_url.clone(),
                reason: format!("unexpected answer: {e}"),
            })
    }

    /// Asks the GeoIP service for the two-letter country code of `ip`.
    pub async fn country_code(&self, ip: IpAddr) -> Result<String> {
        let url = self.geoip_url.replace("{ip}", &ip.to_string());
        let body = self.fetch_text(&url).await?;
        let code = body.trim();
        if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(GensystemError::LookupFailure {
                url,
                reason: format!("unexpected answer: {code:?}"),
            });
        }
        Ok(code.to_ascii_uppercase())
    }

    async fn try_resolve(&self, directory: &MirrorDirectory) -> Result<String> {
        let ip = self.public_ip().await?;
        debug!(%ip, "public address");
        let code = self.country_code(ip).await?;
        debug!(%code, "geoip country");
        country_for_code(&code, directory)
            .map(str::to_string)
            .ok_or(GensystemError::UnknownCountry(code))
    }

    /// Resolves the caller's country to a mirror directory entry.
    ///
    /// Never fails: lookup errors and unknown countries are logged and
    /// reported as `None`.
    pub async fn resolve_country(&self, directory: &MirrorDirectory) -> Option<String> {
        match self.try_resolve(directory).await {
            Ok(country) => Some(country),
            Err(e) => {
                warn!(error = %e, "could not determine country");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn resolver(server: &MockServer) -> GeoResolver {
        GeoResolver::new(
            reqwest::Client::new(),
            format!("{}/ip", server.uri()),
            format!("{}/geo/{{ip}}/country/", server.uri()),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_discrepancies() {
        let directory = MirrorDirectory::builtin();
        assert_eq!(country_for_code("US", &directory), Some("USA"));
        assert_eq!(country_for_code("gb", &directory), Some("UK"));
        assert_eq!(country_for_code("DE", &directory), Some("Germany"));
        assert_eq!(country_for_code("ZZ", &directory), None);
    }

    #[test]
    fn test_discrepancy_needs_directory_entry() {
        let directory = MirrorDirectory::default();
        assert_eq!(country_for_code("US", &directory), None);
    }

    #[tokio::test]
    async fn test_resolve_country() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ip"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ip":"8.8.8.8"}"#))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/geo/8.8.8.8/country/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("US\n"))
            .mount(&server)
            .await;

        let country = resolver(&server)
            .resolve_country(&MirrorDirectory::builtin())
            .await;
        assert_eq!(country.as_deref(), Some("USA"));
    }

    #[tokio::test]
    async fn test_unknown_country_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ip"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ip":"10.0.0.1"}"#))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/geo/10.0.0.1/country/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("AQ"))
            .mount(&server)
            .await;

        let geo = resolver(&server);
        let directory = MirrorDirectory::builtin();
        assert!(matches!(
            geo.try_resolve(&directory).await,
            Err(GensystemError::UnknownCountry(code)) if code == "AQ"
        ));
        assert_eq!(geo.resolve_country(&directory).await, None);
    }

    #[tokio::test]
    async fn test_lookup_failures_are_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ip"))
            .respond_with(ResponseTemplate::new(200).set_body_string("I SHOULD BE JSON"))
            .mount(&server)
            .await;

        let geo = resolver(&server);
        assert!(matches!(
            geo.public_ip().await,
            Err(GensystemError::LookupFailure { .. })
        ));
        assert_eq!(geo.resolve_country(&MirrorDirectory::builtin()).await, None);
    }

    #[tokio::test]
    async fn test_geoip_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/geo/1.2.3.4/country/"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = resolver(&server)
            .country_code("1.2.3.4".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, GensystemError::LookupFailure { .. }));
    }
}
