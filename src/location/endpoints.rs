use castor_schema::StorageLocation;
use url::Url;

use crate::error::CastorError;

/// Appends `path` to the base URI's path and `query` after any query the base already carries
/// (e.g. a SAS token).
fn build_request_url(base: &Url, path: &str, query: &[(String, String)]) -> Url {
    let mut url = base.clone();
    let joined = format!(
        "{}/{}",
        base.path().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    url.set_path(&joined);
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    url
}

fn check_base(role: &str, url: &Url) -> Result<(), CastorError> {
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(CastorError::configuration(format!(
            "{role} endpoint must be an absolute http(s) URI, got {url}"
        )));
    }
    if url.fragment().is_some() {
        return Err(CastorError::configuration(format!(
            "{role} endpoint must not carry a fragment, got {url}"
        )));
    }
    Ok(())
}

/// Primary and optional secondary base URIs of one storage account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSet {
    primary: Url,
    secondary: Option<Url>,
}

impl EndpointSet {
    pub fn new(primary: Url, secondary: Option<Url>) -> Result<Self, CastorError> {
        check_base("primary", &primary)?;
        if let Some(secondary) = &secondary {
            check_base("secondary", secondary)?;
            if *secondary == primary {
                return Err(CastorError::configuration(
                    "secondary endpoint must differ from the primary endpoint",
                ));
            }
        }
        Ok(Self { primary, secondary })
    }

    pub fn primary(&self) -> &Url {
        &self.primary
    }

    pub fn secondary(&self) -> Option<&Url> {
        self.secondary.as_ref()
    }

    pub fn has_secondary(&self) -> bool {
        self.secondary.is_some()
    }

    pub fn get(&self, location: StorageLocation) -> Option<&Url> {
        match location {
            StorageLocation::Primary => Some(&self.primary),
            StorageLocation::Secondary => self.secondary.as_ref(),
        }
    }

    pub(crate) fn request_url(
        &self,
        location: StorageLocation,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Url, CastorError> {
        let base = self.get(location).ok_or_else(|| {
            CastorError::configuration(format!("no {location} endpoint configured"))
        })?;
        Ok(build_request_url(base, path, query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(raw: &str) -> Url {
        Url::parse(raw).expect("invalid url")
    }

    #[test]
    fn request_url_joins_path_and_keeps_base_query() {
        let endpoints = EndpointSet::new(
            url("http://127.0.0.1:10002/devstoreaccount1?sv=2020&sig=abc"),
            Some(url("http://127.0.0.1:10002/devstoreaccount1-secondary")),
        )
        .expect("valid endpoints");

        let primary = endpoints
            .request_url(
                StorageLocation::Primary,
                "/Tables",
                &[("$top".to_string(), "5".to_string())],
            )
            .expect("primary url");
        assert_eq!(
            primary.as_str(),
            "http://127.0.0.1:10002/devstoreaccount1/Tables?sv=2020&sig=abc&%24top=5"
        );

        let secondary = endpoints
            .request_url(StorageLocation::Secondary, "Tables", &[])
            .expect("secondary url");
        assert_eq!(
            secondary.as_str(),
            "http://127.0.0.1:10002/devstoreaccount1-secondary/Tables"
        );
    }

    #[test]
    fn request_url_on_root_base() {
        let endpoints =
            EndpointSet::new(url("https://acct.blob.core.windows.net/"), None).expect("valid");
        let built = endpoints
            .request_url(StorageLocation::Primary, "container/blob", &[])
            .expect("url");
        assert_eq!(
            built.as_str(),
            "https://acct.blob.core.windows.net/container/blob"
        );
    }

    #[test]
    fn missing_secondary_is_a_configuration_error() {
        let endpoints =
            EndpointSet::new(url("https://acct.blob.core.windows.net/"), None).expect("valid");
        assert!(matches!(
            endpoints.request_url(StorageLocation::Secondary, "x", &[]),
            Err(CastorError::Configuration(_))
        ));
    }

    #[test]
    fn rejects_non_http_and_duplicate_endpoints() {
        assert!(EndpointSet::new(url("ftp://acct/"), None).is_err());
        assert!(EndpointSet::new(url("mailto:someone@example.com"), None).is_err());
        assert!(
            EndpointSet::new(
                url("https://acct.blob.core.windows.net/"),
                Some(url("https://acct.blob.core.windows.net/")),
            )
            .is_err()
        );
    }
}
