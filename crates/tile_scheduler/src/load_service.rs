use crate::error::SchedulerError;
use crate::network::Status;
use crate::tile_types::TileLayer;
use bytes::Bytes;
use rand::seq::SliceRandom;
use std::str::FromStr;
use std::time::Duration;
use tile_core::{srs, Id, Scheme};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Path layout of a tile server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlPattern {
    /// `{base}{z}/{x}/{y}{ext}`, rows counted from the south.
    Zxy,
    /// `{base}{z}/{y}/{x}{ext}`, rows counted from the south.
    Zyx,
    /// `{base}{z}/{x}/{y}{ext}`, rows counted from the north.
    ZxyYPointingSouth,
    /// `{base}{z}/{y}/{x}{ext}`, rows counted from the north.
    ZyxYPointingSouth,
}

impl FromStr for UrlPattern {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zxy" => Ok(Self::Zxy),
            "zyx" => Ok(Self::Zyx),
            "zxy_yflip" | "zxy_y_pointing_south" => Ok(Self::ZxyYPointingSouth),
            "zyx_yflip" | "zyx_y_pointing_south" => Ok(Self::ZyxYPointingSouth),
            _ => Err(SchedulerError::UnknownUrlPattern(s.to_owned())),
        }
    }
}

/// Fetches single layers of tiles from one server. Never retries.
#[derive(Debug, Clone)]
pub struct TileLoadService {
    base_url: String,
    pattern: UrlPattern,
    file_ending: String,
    load_balancing_targets: Vec<String>,
    client: reqwest::Client,
}

impl TileLoadService {
    pub fn new(base_url: impl Into<String>, pattern: UrlPattern, file_ending: impl Into<String>) -> Result<Self, SchedulerError> {
        let base_url = base_url.into();
        if base_url.is_empty() {
            return Err(SchedulerError::EmptyBaseUrl);
        }
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            base_url,
            pattern,
            file_ending: file_ending.into(),
            load_balancing_targets: Vec::new(),
            client,
        })
    }

    /// Hosts substituted for `{s}` in the base url, picked at random per request.
    pub fn with_load_balancing_targets(mut self, targets: Vec<String>) -> Result<Self, SchedulerError> {
        if self.base_url.contains("{s}") && targets.is_empty() {
            return Err(SchedulerError::MissingLoadBalancingTargets(self.base_url));
        }
        self.load_balancing_targets = targets;
        Ok(self)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_tile_url(&self, id: Id) -> String {
        let tms = id.to(Scheme::Tms);
        let z = tms.zoom_level;
        let x = tms.coords.x;
        let y = match self.pattern {
            UrlPattern::Zxy | UrlPattern::Zyx => tms.coords.y,
            UrlPattern::ZxyYPointingSouth | UrlPattern::ZyxYPointingSouth => {
                srs::number_of_horizontal_tiles_for_zoom_level(z) - 1 - tms.coords.y
            }
        };
        let base = match self.load_balancing_targets.choose(&mut rand::thread_rng()) {
            Some(target) => self.base_url.replace("{s}", target),
            None => self.base_url.clone(),
        };
        match self.pattern {
            UrlPattern::Zxy | UrlPattern::ZxyYPointingSouth => format!("{base}{z}/{x}/{y}{}", self.file_ending),
            UrlPattern::Zyx | UrlPattern::ZyxYPointingSouth => format!("{base}{z}/{y}/{x}{}", self.file_ending),
        }
    }

    /// Loads one layer of `id`. Failures are folded into the returned status.
    pub async fn load(&self, id: Id) -> TileLayer {
        let url = self.build_tile_url(id);
        let (status, data) = match url.strip_prefix("file://") {
            Some(path) => load_file(path).await,
            None => self.load_http(&url).await,
        };
        tracing::debug!(tile = %id, url = %url, status = ?status, bytes = data.len(), "tile layer loaded");
        TileLayer::new(id, status, data)
    }

    async fn load_http(&self, url: &str) -> (Status, Bytes) {
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(url, error = %e, "tile request failed");
                return (Status::NetworkError, Bytes::new());
            }
        };
        let code = response.status();
        if code.is_client_error() {
            return (Status::NotFound, Bytes::new());
        }
        if !code.is_success() {
            return (Status::NetworkError, Bytes::new());
        }
        match response.bytes().await {
            Ok(body) if body.is_empty() => (Status::NotFound, body),
            Ok(body) => (Status::Good, body),
            Err(e) => {
                tracing::debug!(url, error = %e, "tile body truncated");
                (Status::NetworkError, Bytes::new())
            }
        }
    }
}

async fn load_file(path: &str) -> (Status, Bytes) {
    match tokio::fs::read(path).await {
        Ok(data) if data.is_empty() => (Status::NotFound, Bytes::new()),
        Ok(data) => (Status::Good, Bytes::from(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => (Status::NotFound, Bytes::new()),
        Err(e) => {
            tracing::debug!(path, error = %e, "tile file unreadable");
            (Status::NetworkError, Bytes::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(pattern: UrlPattern) -> TileLoadService {
        TileLoadService::new("https://tiles.example.org/alpine/", pattern, ".png").unwrap()
    }

    #[test]
    fn url_patterns() {
        let id = Id::new(3, 5, 1, Scheme::Tms);
        assert_eq!(service(UrlPattern::Zxy).build_tile_url(id), "https://tiles.example.org/alpine/3/5/1.png");
        assert_eq!(service(UrlPattern::Zyx).build_tile_url(id), "https://tiles.example.org/alpine/3/1/5.png");
        assert_eq!(service(UrlPattern::ZxyYPointingSouth).build_tile_url(id), "https://tiles.example.org/alpine/3/5/6.png");
        assert_eq!(service(UrlPattern::ZyxYPointingSouth).build_tile_url(id), "https://tiles.example.org/alpine/3/6/5.png");
    }

    #[test]
    fn slippy_ids_are_converted_first() {
        let id = Id::new(3, 5, 6, Scheme::SlippyMap);
        assert_eq!(service(UrlPattern::ZxyYPointingSouth).build_tile_url(id), "https://tiles.example.org/alpine/3/5/6.png");
    }

    #[test]
    fn load_balancing_substitutes_host() {
        let svc = TileLoadService::new("https://{s}.tiles.example.org/", UrlPattern::Zxy, ".jpeg")
            .unwrap()
            .with_load_balancing_targets(vec!["a".into(), "b".into()])
            .unwrap();
        let url = svc.build_tile_url(Id::root());
        assert!(url == "https://a.tiles.example.org/0/0/0.jpeg" || url == "https://b.tiles.example.org/0/0/0.jpeg");

        let missing = TileLoadService::new("https://{s}.x/", UrlPattern::Zxy, ".png").unwrap().with_load_balancing_targets(vec![]);
        assert!(matches!(missing, Err(SchedulerError::MissingLoadBalancingTargets(_))));
    }

    #[test]
    fn pattern_parsing() {
        assert_eq!("ZXY".parse::<UrlPattern>().unwrap(), UrlPattern::Zxy);
        assert_eq!("zyx_yflip".parse::<UrlPattern>().unwrap(), UrlPattern::ZyxYPointingSouth);
        assert!("xyz".parse::<UrlPattern>().is_err());
    }

    #[tokio::test]
    async fn file_urls_classify_status() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("1/0")).unwrap();
        std::fs::write(dir.path().join("1/0/1.png"), b"\x89PNG....").unwrap();
        std::fs::write(dir.path().join("1/0/0.png"), b"").unwrap();

        let base = format!("file://{}/", dir.path().display());
        let svc = TileLoadService::new(base, UrlPattern::Zxy, ".png").unwrap();

        let good = svc.load(Id::new(1, 0, 1, Scheme::Tms)).await;
        assert_eq!(good.network_info.status, Status::Good);
        assert_eq!(&good.data[..4], b"\x89PNG");

        let empty = svc.load(Id::new(1, 0, 0, Scheme::Tms)).await;
        assert_eq!(empty.network_info.status, Status::NotFound);

        let missing = svc.load(Id::new(1, 1, 1, Scheme::Tms)).await;
        assert_eq!(missing.network_info.status, Status::NotFound);
        assert!(missing.data.is_empty());
    }
}
