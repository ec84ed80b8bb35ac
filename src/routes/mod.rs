//! HTTP API, mounted under `/api`.

pub mod events;
pub mod invites;
pub mod live;
pub mod photos;
pub mod registry;
pub mod vendors;

use crate::error::{ApiError, ApiResult};
use crate::models::Location;
use rocket::Route;

/// Every API route.
pub fn api() -> Vec<Route> {
    let mut routes = photos::routes();
    routes.extend(invites::routes());
    routes.extend(events::routes());
    routes.extend(registry::routes());
    routes.extend(vendors::routes());
    routes.extend(live::routes());
    routes
}

/// Parses an optional `location` parameter; empty means "not given".
fn parse_location(raw: Option<&str>) -> ApiResult<Option<Location>> {
    match raw.map(str::trim).filter(|r| !r.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e: crate::models::UnknownLocation| ApiError::BadRequest(e.to_string())),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::config::{AppConfig, PipelineConfig, StorageBackend};
    use crate::object_store::{LocalObjectStore, ObjectStore};
    use crate::store::tests::unique_temp_dir;
    use crate::store::{Collections, Database};
    use rocket::http::{ContentType, Header};
    use rocket::local::asynchronous::Client;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    pub(crate) const ADMIN_TOKEN: &str = "test-admin-token";

    /// A running site over an in-memory store and a scratch media directory.
    pub(crate) struct TestSite {
        pub(crate) client: Client,
        pub(crate) db: Arc<Database>,
        pub(crate) media_dir: PathBuf,
    }

    impl Drop for TestSite {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.media_dir);
        }
    }

    pub(crate) fn test_config(media_dir: PathBuf) -> AppConfig {
        AppConfig {
            data_file: media_dir.join("unused.json"),
            storage: StorageBackend::Local {
                root: media_dir,
                public_base: "/media".to_string(),
            },
            admin_token: Some(ADMIN_TOKEN.to_string()),
            allowed_origins: vec!["http://localhost:3000".to_string()],
            site_url: "https://wedding.example".to_string(),
            wedding_title: "Ana & Ben's Wedding".to_string(),
            orphan_scan_interval: Duration::ZERO,
            orphan_grace: Duration::ZERO,
            pipeline: PipelineConfig::default(),
        }
    }

    pub(crate) async fn site_with(config: AppConfig, data: Collections) -> TestSite {
        let StorageBackend::Local { root, .. } = &config.storage else {
            panic!("test sites store media locally");
        };
        let media_dir = root.clone();
        let db = Arc::new(Database::in_memory(data));
        let objects: Arc<dyn ObjectStore> =
            Arc::new(LocalObjectStore::new(media_dir.clone(), "/media".to_string()));

        let rocket = crate::build_rocket(config, db.clone(), objects);
        let client = Client::tracked(rocket).await.unwrap();
        TestSite {
            client,
            db,
            media_dir,
        }
    }

    pub(crate) async fn site(data: Collections) -> TestSite {
        site_with(test_config(unique_temp_dir("wedding_site")), data).await
    }

    pub(crate) fn admin_header() -> Header<'static> {
        Header::new("Authorization", format!("Bearer {}", ADMIN_TOKEN))
    }

    /// One part of a multipart body.
    pub(crate) struct FilePart<'a> {
        name: &'a str,
        file: Option<(&'a str, &'a str)>,
        body: &'a [u8],
    }

    impl<'a> FilePart<'a> {
        pub(crate) fn field(name: &'a str, value: &'a str) -> Self {
            Self {
                name,
                file: None,
                body: value.as_bytes(),
            }
        }

        pub(crate) fn file(
            name: &'a str,
            file_name: &'a str,
            content_type: &'a str,
            body: &'a [u8],
        ) -> Self {
            Self {
                name,
                file: Some((file_name, content_type)),
                body,
            }
        }
    }

    const BOUNDARY: &str = "wedding-test-boundary";

    pub(crate) fn multipart(parts: &[FilePart<'_>]) -> (ContentType, Vec<u8>) {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match part.file {
                Some((file_name, content_type)) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                             Content-Type: {}\r\n\r\n",
                            part.name, file_name, content_type
                        )
                        .as_bytes(),
                    );
                }
                None => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", part.name)
                            .as_bytes(),
                    );
                }
            }
            body.extend_from_slice(part.body);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        let content_type =
            ContentType::new("multipart", "form-data").with_params(("boundary", BOUNDARY));
        (content_type, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_location_param() {
        assert_eq!(parse_location(None).unwrap(), None);
        assert_eq!(parse_location(Some(" ")).unwrap(), None);
        assert_eq!(parse_location(Some("canada")).unwrap(), Some(Location::Canada));
        assert!(matches!(
            parse_location(Some("Mars")),
            Err(ApiError::BadRequest(_))
        ));
    }
}
