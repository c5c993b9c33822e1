use crate::catalog::cookies::{self, Cookie};
use crate::catalog::{CatalogApi, CatalogConnector, Resource, ResourceResponse};
use crate::config::CatalogConfig;
use crate::errors::{GamdlWebError, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, COOKIE, ORIGIN, REFERER};
use reqwest::Client;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const HOME_URL: &str = "https://music.apple.com";
const AMP_API_URL: &str = "https://amp-api.music.apple.com";
const COOKIE_HOST: &str = "music.apple.com";
const MAX_TRACK_PAGES: usize = 50;

/// Apple Music catalog client authenticated with browser cookies
pub struct AppleMusicApi {
    client: Client,
    storefront: String,
    language: String,
}

impl AppleMusicApi {
    /// Create a client from a Netscape cookie file
    pub async fn from_netscape_cookies(path: &Path, config: &CatalogConfig) -> Result<Self> {
        let cookies = cookies::load_netscape(path)?;
        let media_user_token = cookies::find_cookie(&cookies, COOKIE_HOST, "media-user-token")
            .ok_or_else(|| GamdlWebError::Cookies("media-user-token cookie not found".to_string()))?
            .to_string();

        let bootstrap = build_client(config, HeaderMap::new())?;
        let token = fetch_developer_token(&bootstrap).await?;
        debug!("Fetched catalog developer token");

        let headers = session_headers(&token, &media_user_token, &cookies)?;
        let client = build_client(config, headers)?;

        let storefront = match &config.storefront {
            Some(storefront) => storefront.clone(),
            None => fetch_storefront(&client).await?,
        };
        info!("Catalog API ready (storefront {})", storefront);

        Ok(Self {
            client,
            storefront,
            language: config.language.clone(),
        })
    }

    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<ResourceResponse> {
        debug!("Catalog request: GET {}", url);
        let response = self
            .client
            .get(url)
            .query(&[("l", self.language.as_str())])
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GamdlWebError::Catalog(format!(
                "Request to {} failed: {} - {}",
                url,
                status,
                error_text.chars().take(200).collect::<String>()
            )));
        }

        Ok(response.json().await?)
    }

    async fn get_resource(&self, kind: &str, id: &str, query: &[(&str, &str)]) -> Result<Resource> {
        let url = format!("{}/v1/catalog/{}/{}/{}", AMP_API_URL, self.storefront, kind, id);
        let mut response = self.get_json(&url, query).await?;
        if response.data.is_empty() {
            return Err(GamdlWebError::Catalog(format!("No {} found with id {}", kind, id)));
        }
        let mut resource = response.data.swap_remove(0);
        fill_track_pages(&mut resource, |next| async move {
            self.get_json(&format!("{}{}", AMP_API_URL, next), &[]).await
        })
        .await;
        Ok(resource)
    }
}

/// Follow `next` links on the tracks relationship until the full list is loaded.
/// A failing page ends pagination; tracks loaded so far are kept.
async fn fill_track_pages<F, Fut>(resource: &mut Resource, mut fetch_page: F)
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<ResourceResponse>>,
{
    let Some(tracks) = resource.relationships.tracks.as_mut() else {
        return;
    };

    let mut pages = 0;
    while let Some(next) = tracks.next.take() {
        if pages == MAX_TRACK_PAGES {
            debug!("Stopping track pagination for {} after {} pages", resource.id, pages);
            break;
        }
        match fetch_page(next).await {
            Ok(page) => {
                tracks.data.extend(page.data);
                tracks.next = page.next;
                pages += 1;
            }
            Err(e) => {
                warn!(
                    "Track list of {} truncated at {} tracks: {}",
                    resource.id,
                    tracks.data.len(),
                    e
                );
                break;
            }
        }
    }
}

#[async_trait]
impl CatalogApi for AppleMusicApi {
    async fn get_album(&self, id: &str) -> Result<Resource> {
        self.get_resource("albums", id, &[]).await
    }

    async fn get_playlist(&self, id: &str) -> Result<Resource> {
        self.get_resource("playlists", id, &[]).await
    }

    async fn get_song(&self, id: &str) -> Result<Resource> {
        self.get_resource("songs", id, &[]).await
    }

    async fn get_artist(&self, id: &str) -> Result<Resource> {
        self.get_resource(
            "artists",
            id,
            &[
                ("include", "albums,music-videos"),
                ("limit[albums]", "100"),
                ("limit[music-videos]", "100"),
            ],
        )
        .await
    }
}

fn build_client(config: &CatalogConfig, headers: HeaderMap) -> Result<Client> {
    let mut builder = Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .user_agent(&config.user_agent)
        .default_headers(headers);

    if let Some(proxy_url) = config.proxy.url()? {
        builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
    }

    Ok(builder.build()?)
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| GamdlWebError::Cookies(format!("Cookie value is not a valid header: {}", e)))
}

fn session_headers(token: &str, media_user_token: &str, cookies: &[Cookie]) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", token))?);
    headers.insert(HeaderName::from_static("media-user-token"), header_value(media_user_token)?);
    headers.insert(COOKIE, header_value(&cookies::cookie_header(cookies, COOKIE_HOST))?);
    headers.insert(ORIGIN, HeaderValue::from_static(HOME_URL));
    headers.insert(REFERER, HeaderValue::from_static(HOME_URL));
    Ok(headers)
}

/// Extract the web player's script path from the home page
fn find_index_script(home_page: &str) -> Option<String> {
    let regex = Regex::new(r#"/(assets/index(?:-legacy)?[~-][^/"]+\.js)"#).ok()?;
    regex.captures(home_page).map(|captures| captures[1].to_string())
}

/// Extract the bearer token embedded in the web player's script
fn find_token(script: &str) -> Option<String> {
    let regex = Regex::new(r#"eyJh[^"]+"#).ok()?;
    regex.find(script).map(|m| m.as_str().to_string())
}

async fn fetch_developer_token(client: &Client) -> Result<String> {
    let home_page = client.get(HOME_URL).send().await?.error_for_status()?.text().await?;
    let script_path = find_index_script(&home_page)
        .ok_or_else(|| GamdlWebError::Catalog("Could not locate the web player script".to_string()))?;

    let script = client
        .get(format!("{}/{}", HOME_URL, script_path))
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    find_token(&script).ok_or_else(|| GamdlWebError::Catalog("Could not find the catalog token".to_string()))
}

async fn fetch_storefront(client: &Client) -> Result<String> {
    let response = client
        .get(format!("{}/v1/me/storefront", AMP_API_URL))
        .send()
        .await?;

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(GamdlWebError::Cookies("Authentication failed - cookies may be expired".to_string()));
    }
    if status == reqwest::StatusCode::FORBIDDEN {
        return Err(GamdlWebError::Cookies("Access forbidden - no active subscription".to_string()));
    }

    let body: ResourceResponse = response.error_for_status()?.json().await?;
    body.data
        .into_iter()
        .next()
        .map(|storefront| storefront.id)
        .ok_or_else(|| GamdlWebError::Catalog("Account has no storefront".to_string()))
}

struct CachedSession<T> {
    path: PathBuf,
    modified: Option<SystemTime>,
    session: T,
}

/// Last session built from a cookie file, valid while the file is unchanged
struct SessionCache<T> {
    slot: Mutex<Option<CachedSession<T>>>,
}

impl<T: Clone> SessionCache<T> {
    fn new() -> Self {
        Self { slot: Mutex::new(None) }
    }

    /// Return the cached session for `path` or build a new one.
    /// The lock is not held while `connect` runs.
    async fn get_or_connect<F, Fut>(&self, path: &Path, connect: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();

        if let Some(cached) = self.slot.lock().await.as_ref() {
            if cached.path == path && cached.modified == modified {
                return Ok(cached.session.clone());
            }
        }

        let session = connect().await?;
        *self.slot.lock().await = Some(CachedSession {
            path: path.to_path_buf(),
            modified,
            session: session.clone(),
        });
        Ok(session)
    }
}

/// Connects to Apple Music, reusing the last client while the cookie file is unchanged
pub struct AppleMusicConnector {
    config: CatalogConfig,
    cache: SessionCache<Arc<AppleMusicApi>>,
}

impl AppleMusicConnector {
    pub fn new(config: CatalogConfig) -> Self {
        Self {
            config,
            cache: SessionCache::new(),
        }
    }
}

#[async_trait]
impl CatalogConnector for AppleMusicConnector {
    async fn connect(&self, cookies_path: &Path) -> Result<Arc<dyn CatalogApi>> {
        let api = self
            .cache
            .get_or_connect(cookies_path, || async {
                Ok(Arc::new(AppleMusicApi::from_netscape_cookies(cookies_path, &self.config).await?))
            })
            .await?;
        Ok(api)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::preview::build_previews;
    use crate::catalog::Relationship;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_find_index_script() {
        let html = r#"<script type="module" crossorigin src="/assets/index-legacy-5a1b2c3d.js"></script>"#;
        assert_eq!(find_index_script(html).as_deref(), Some("assets/index-legacy-5a1b2c3d.js"));

        let html = r#"<script src="/assets/index~9f8e7d.js"></script>"#;
        assert_eq!(find_index_script(html).as_deref(), Some("assets/index~9f8e7d.js"));

        assert_eq!(find_index_script("<html></html>"), None);
    }

    #[test]
    fn test_find_token() {
        let script = r#"const x="abc",token="eyJhbGciOiJFUzI1NiJ9.payload.sig",y=1"#;
        assert_eq!(find_token(script).as_deref(), Some("eyJhbGciOiJFUzI1NiJ9.payload.sig"));
        assert_eq!(find_token("no token"), None);
    }

    #[test]
    fn test_session_headers() {
        let cookies = cookies::parse_netscape(".apple.com\tTRUE\t/\tTRUE\t0\tmedia-user-token\tTOKEN\n");
        let headers = session_headers("dev", "TOKEN", &cookies).unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer dev");
        assert_eq!(headers["media-user-token"], "TOKEN");
        assert_eq!(headers[COOKIE], "media-user-token=TOKEN");
        assert_eq!(headers[ORIGIN], HOME_URL);
    }

    fn track(id: &str, millis: u64) -> Resource {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "type": "songs",
            "attributes": {"name": format!("Track {}", id), "artistName": "Band", "durationInMillis": millis}
        }))
        .unwrap()
    }

    fn page(ids: &[&str], next: Option<&str>) -> ResourceResponse {
        ResourceResponse {
            data: ids.iter().map(|id| track(id, 60_000)).collect(),
            next: next.map(str::to_string),
        }
    }

    fn album_with_first_page() -> Resource {
        let mut album: Resource = serde_json::from_value(serde_json::json!({
            "id": "100",
            "type": "albums",
            "attributes": {"name": "Long Record", "artistName": "Band"}
        }))
        .unwrap();
        album.relationships.tracks = Some(Relationship {
            data: vec![track("1", 60_000), track("2", 60_000)],
            next: Some("/v1/catalog/us/albums/100/tracks?offset=2".to_string()),
        });
        album
    }

    struct LoadedCatalog(Resource);

    #[async_trait]
    impl CatalogApi for LoadedCatalog {
        async fn get_album(&self, _id: &str) -> Result<Resource> {
            Ok(self.0.clone())
        }

        async fn get_playlist(&self, id: &str) -> Result<Resource> {
            Err(GamdlWebError::NotFound(id.to_string()))
        }

        async fn get_song(&self, id: &str) -> Result<Resource> {
            Err(GamdlWebError::NotFound(id.to_string()))
        }

        async fn get_artist(&self, id: &str) -> Result<Resource> {
            Err(GamdlWebError::NotFound(id.to_string()))
        }
    }

    #[tokio::test]
    async fn test_track_pages_are_followed() {
        let mut pages = HashMap::from([
            (
                "/v1/catalog/us/albums/100/tracks?offset=2".to_string(),
                page(&["3", "4"], Some("/v1/catalog/us/albums/100/tracks?offset=4")),
            ),
            ("/v1/catalog/us/albums/100/tracks?offset=4".to_string(), page(&["5"], None)),
        ]);

        let mut album = album_with_first_page();
        fill_track_pages(&mut album, |next| {
            let page = pages.remove(&next);
            async move { page.ok_or_else(|| GamdlWebError::Catalog(format!("unexpected page {}", next))) }
        })
        .await;

        let ids: Vec<_> = album.tracks().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "3", "4", "5"]);
        assert!(pages.is_empty());

        let catalog = LoadedCatalog(album);
        let urls = vec!["https://music.apple.com/us/album/long-record/100".to_string()];
        let records = build_previews(Some(&catalog as &dyn CatalogApi), &urls, 3).await;
        assert_eq!(records[0].tracks.len(), 3);
        assert!(records[0].has_more_tracks);
        assert_eq!(records[0].actual_tracks, Some(5));
        assert_eq!(records[0].total_duration.as_deref(), Some("5:00"));
    }

    #[tokio::test]
    async fn test_failed_track_page_keeps_loaded_tracks() {
        let mut album = album_with_first_page();
        let mut requests = 0;
        fill_track_pages(&mut album, |_next| {
            requests += 1;
            async { Err(GamdlWebError::Catalog("502 Bad Gateway".to_string())) }
        })
        .await;

        assert_eq!(requests, 1);
        assert_eq!(album.tracks().len(), 2);
        assert!(album.relationships.tracks.as_ref().unwrap().next.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_cache_does_not_serialize_connects() {
        let cache: SessionCache<u32> = SessionCache::new();
        let slow_connect = |value: u32| async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<u32, GamdlWebError>(value)
        };

        let started = tokio::time::Instant::now();
        let (a, b) = tokio::join!(
            cache.get_or_connect(Path::new("/nonexistent/a.txt"), || slow_connect(1)),
            cache.get_or_connect(Path::new("/nonexistent/b.txt"), || slow_connect(2)),
        );
        assert_eq!((a.unwrap(), b.unwrap()), (1, 2));
        assert!(started.elapsed() < Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_session_cache_reuses_session_for_unchanged_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.txt");
        std::fs::write(&path, "x").unwrap();

        let cache: SessionCache<u32> = SessionCache::new();
        let connects = AtomicUsize::new(0);
        for _ in 0..3 {
            let value = cache
                .get_or_connect(&path, || async {
                    connects.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await
                .unwrap();
            assert_eq!(value, 7);
        }
        assert_eq!(connects.load(Ordering::SeqCst), 1);

        let failing = cache
            .get_or_connect(Path::new("/nonexistent/other.txt"), || async {
                Err::<u32, _>(GamdlWebError::Cookies("expired".to_string()))
            })
            .await;
        assert!(failing.is_err());
    }

    #[tokio::test]
    async fn test_connect_without_token_cookie_fails_before_network() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.txt");
        std::fs::write(&path, ".apple.com\tTRUE\t/\tTRUE\t0\tother\tvalue\n").unwrap();

        let connector = AppleMusicConnector::new(CatalogConfig::default());
        let err = connector.connect(&path).await.err().unwrap();
        assert!(matches!(err, GamdlWebError::Cookies(_)));
    }
}
