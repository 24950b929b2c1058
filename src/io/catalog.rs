use crate::config::PipelineConfig;
use crate::types::{CbersError, CbersResult, Sensor};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Spatio-temporal query sent to a STAC search endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct StacQuery {
    pub instrument: Sensor,
    /// YYYY-MM-DD
    pub start_date: String,
    /// YYYY-MM-DD
    pub end_date: String,
    /// [minx, miny, maxx, maxy] in degrees
    pub bbox: [f64; 4],
    pub level: Option<String>,
    pub limit: usize,
}

/// Raw scene discovery. Both queries return unparsed scene identifiers.
pub trait CatalogTransport {
    /// Scene identifiers under one path/row tile, in date order
    fn list_path_row(&self, sensor: Sensor, path: u32, row: u32) -> CbersResult<Vec<String>>;

    /// Scene identifiers matching a STAC query, in no particular order
    fn stac_search(&self, query: &StacQuery) -> CbersResult<Vec<String>>;
}

#[derive(Debug, Serialize)]
struct StacEq<'a> {
    eq: &'a str,
}

#[derive(Debug, Serialize)]
struct StacFilters<'a> {
    #[serde(rename = "eo:instrument")]
    instrument: StacEq<'a>,
    #[serde(rename = "cbers:data_type", skip_serializing_if = "Option::is_none")]
    data_type: Option<StacEq<'a>>,
}

#[derive(Debug, Serialize)]
struct StacRequestBody<'a> {
    limit: usize,
    bbox: [f64; 4],
    time: String,
    query: StacFilters<'a>,
}

#[derive(Debug, Deserialize)]
struct StacFeature {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StacResponse {
    #[serde(default)]
    features: Vec<StacFeature>,
}

/// Turn a service answer into its body, or into a `Catalog` error carrying
/// the status. `body` is the read attempt; an unreadable body of a failed
/// response still reports the status.
pub fn check_status(status: u16, body: Result<String, String>) -> CbersResult<String> {
    let success = (200..300).contains(&status);
    match (success, body) {
        (true, Ok(body)) => Ok(body),
        (true, Err(e)) => Err(CbersError::Http(format!("Failed to read response: {}", e))),
        (false, Ok(body)) => Err(CbersError::Catalog { status, body }),
        (false, Err(e)) => Err(CbersError::Catalog {
            status,
            body: format!("<unreadable body: {}>", e),
        }),
    }
}

/// Scene identifiers of a STAC search response.
///
/// A response holding `limit` features or more may have been cut short by
/// the service and is rejected.
pub fn parse_stac_response(text: &str, limit: usize) -> CbersResult<Vec<String>> {
    let parsed: StacResponse = serde_json::from_str(text)?;
    if parsed.features.len() >= limit {
        return Err(CbersError::Catalog {
            status: 200,
            body: format!(
                "Possible truncation on the number of returned scenes ({} >= limit {})",
                parsed.features.len(),
                limit
            ),
        });
    }
    Ok(parsed.features.into_iter().map(|f| f.id).collect())
}

/// Scene identifiers from the entries of a path/row directory listing,
/// sorted so that the shared name prefix leaves them in date order
pub fn listing_scene_ids(entries: &[PathBuf]) -> Vec<String> {
    let mut ids: Vec<String> = entries
        .iter()
        .filter_map(|entry| entry.file_name())
        .filter_map(|name| name.to_str())
        .filter(|name| !name.is_empty() && !name.starts_with('.'))
        .map(str::to_string)
        .collect();
    ids.sort();
    ids
}

fn stac_time_range(start_date: &str, end_date: &str) -> String {
    format!("{}T00:00:00Z/{}T23:59:59Z", start_date, end_date)
}

/// Catalog transport over the archive bucket (listed through GDAL's
/// signed `/vsis3` driver) and an HTTP STAC search endpoint
pub struct HttpCatalog {
    client: reqwest::blocking::Client,
    listing_root: String,
    stac_endpoint: String,
}

impl HttpCatalog {
    pub fn new(config: &PipelineConfig) -> CbersResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .user_agent(concat!("cbersgif/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CbersError::Http(format!("Failed to create HTTP client: {}", e)))?;

        if config.requester_pays {
            gdal::config::set_config_option("AWS_REQUEST_PAYER", "requester")?;
        }

        Ok(Self {
            client,
            listing_root: config.raster_prefix.trim_end_matches('/').to_string(),
            stac_endpoint: config.stac_endpoint.clone(),
        })
    }

    /// True if the STAC endpoint answers with a success status
    pub fn is_online(&self) -> bool {
        match self.client.get(&self.stac_endpoint).send() {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                log::debug!("STAC endpoint unreachable: {}", e);
                false
            }
        }
    }

    pub fn stac_endpoint(&self) -> &str {
        &self.stac_endpoint
    }

    fn read_body(response: reqwest::blocking::Response) -> CbersResult<String> {
        let status = response.status().as_u16();
        check_status(status, response.text().map_err(|e| e.to_string()))
    }
}

impl CatalogTransport for HttpCatalog {
    fn list_path_row(&self, sensor: Sensor, path: u32, row: u32) -> CbersResult<Vec<String>> {
        let dir = format!(
            "{}/CBERS4/{}/{:03}/{:03}/",
            self.listing_root, sensor, path, row
        );
        log::debug!("Listing {}", dir);

        let entries = gdal::vsi::read_dir(&dir, false)
            .map_err(|e| CbersError::Listing(format!("{}: {}", dir, e)))?;
        let ids = listing_scene_ids(&entries);

        log::debug!("{} scene prefixes listed under {}", ids.len(), dir);
        Ok(ids)
    }

    fn stac_search(&self, query: &StacQuery) -> CbersResult<Vec<String>> {
        let instrument = query.instrument.to_string();
        let body = StacRequestBody {
            limit: query.limit,
            bbox: query.bbox,
            time: stac_time_range(&query.start_date, &query.end_date),
            query: StacFilters {
                instrument: StacEq { eq: &instrument },
                data_type: query.level.as_deref().map(|eq| StacEq { eq }),
            },
        };

        log::debug!("POST {} {}", self.stac_endpoint, serde_json::to_string(&body)?);
        let response = self
            .client
            .post(&self.stac_endpoint)
            .json(&body)
            .send()
            .map_err(|e| CbersError::Http(format!("STAC search failed: {}", e)))?;
        let text = Self::read_body(response)?;

        parse_stac_response(&text, query.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    fn feature_collection(count: usize) -> String {
        let features: Vec<String> = (0..count)
            .map(|i| format!(r#"{{"id":"CBERS_4_MUX_201502{:02}_151_126_L2","properties":{{}}}}"#, i + 1))
            .collect();
        format!(r#"{{"type":"FeatureCollection","features":[{}]}}"#, features.join(","))
    }

    fn catalog_at(endpoint: String) -> HttpCatalog {
        let config = PipelineConfig {
            stac_endpoint: endpoint,
            requester_pays: false,
            http_timeout_secs: 5,
            ..Default::default()
        };
        HttpCatalog::new(&config).unwrap()
    }

    #[test]
    fn test_stac_body_serialization() {
        let body = StacRequestBody {
            limit: 300,
            bbox: [-43.1729, -22.9068, -43.1729, -22.9068],
            time: stac_time_range("2014-01-01", "2015-01-30"),
            query: StacFilters {
                instrument: StacEq { eq: "AWFI" },
                data_type: Some(StacEq { eq: "L2" }),
            },
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["time"], "2014-01-01T00:00:00Z/2015-01-30T23:59:59Z");
        assert_eq!(value["query"]["eo:instrument"]["eq"], "AWFI");
        assert_eq!(value["query"]["cbers:data_type"]["eq"], "L2");

        let no_level = StacFilters {
            instrument: StacEq { eq: "MUX" },
            data_type: None,
        };
        let value = serde_json::to_value(&no_level).unwrap();
        assert!(value.get("cbers:data_type").is_none());
    }

    #[test]
    fn test_stac_response_below_limit() {
        let ids = parse_stac_response(&feature_collection(2), 3).unwrap();
        assert_eq!(
            ids,
            vec!["CBERS_4_MUX_20150201_151_126_L2", "CBERS_4_MUX_20150202_151_126_L2"]
        );
        assert!(parse_stac_response(r#"{"type":"FeatureCollection"}"#, 3).unwrap().is_empty());
    }

    #[test]
    fn test_stac_response_at_limit_is_truncation() {
        let err = parse_stac_response(&feature_collection(3), 3).unwrap_err();
        match err {
            CbersError::Catalog { status, body } => {
                assert_eq!(status, 200);
                assert!(body.contains("Possible truncation"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(parse_stac_response(&feature_collection(4), 3).is_err());
        assert!(matches!(parse_stac_response("<html>", 3), Err(CbersError::Json(_))));
    }

    #[test]
    fn test_failed_status_keeps_code_and_body() {
        let err = check_status(502, Ok("Bad Gateway: upstream timed out".to_string())).unwrap_err();
        match err {
            CbersError::Catalog { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body, "Bad Gateway: upstream timed out");
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(check_status(200, Ok("{}".to_string())).unwrap(), "{}");
    }

    #[test]
    fn test_unreadable_body_keeps_status() {
        let err = check_status(403, Err("connection reset".to_string())).unwrap_err();
        match err {
            CbersError::Catalog { status, body } => {
                assert_eq!(status, 403);
                assert!(body.contains("connection reset"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(matches!(
            check_status(200, Err("connection reset".to_string())),
            Err(CbersError::Http(_))
        ));
    }

    #[test]
    fn test_listing_entries_to_scene_ids() {
        let entries = vec![
            PathBuf::from("CBERS_4_MUX_20170518_100_100_L2"),
            PathBuf::from("CBERS_4_MUX_20160416_100_100_L2/"),
            PathBuf::from(".keep"),
        ];
        assert_eq!(
            listing_scene_ids(&entries),
            vec!["CBERS_4_MUX_20160416_100_100_L2", "CBERS_4_MUX_20170518_100_100_L2"]
        );
        assert!(listing_scene_ids(&[]).is_empty());
    }

    #[test]
    fn test_offline_endpoint() {
        // Bind then release a port so nothing listens on it
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let catalog = catalog_at(format!("http://127.0.0.1:{}/search", port));
        assert!(!catalog.is_online());
    }

    #[test]
    fn test_online_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).unwrap();
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}")
                .unwrap();
        });

        let catalog = catalog_at(format!("http://{}/search", addr));
        assert!(catalog.is_online());
        server.join().unwrap();
    }
}
