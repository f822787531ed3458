use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use tracing::{debug, info, warn};

use crate::crawl_log::{CrawlLog, LogEntry, Outcome};
use crate::error::{FetchError, PipelineError};
use crate::links;
use crate::parser;
use crate::record::{ExtractedRecord, EXTRACTED_HEADERS};
use crate::settings::Settings;
use crate::table::{self, EXTRACTED_PREFIX};
use crate::throttle::HostThrottle;

const FILE_SCHEME: &str = "file://";

/// Crawl stats returned after completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

pub struct CrawlOutput {
    pub stats: CrawlStats,
    pub extracted: PathBuf,
    pub log: PathBuf,
}

struct Fetched {
    body: String,
    status: Option<u16>,
}

/// Sequential fetch-and-extract loop. One request at a time, throttled per host.
pub struct Crawler {
    client: Client,
    throttle: HostThrottle,
}

impl Crawler {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .user_agent(settings.user_agent.clone())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Crawler {
            client,
            throttle: HostThrottle::new(settings.delay()?),
        })
    }

    /// Crawl `urls` in order, writing `extraidos-N.csv` and `extraidos-N.log`
    /// into `out_dir`. Per-URL failures are logged and skipped.
    pub fn crawl(&mut self, urls: &[String], out_dir: &Path) -> Result<CrawlOutput, PipelineError> {
        table::ensure_dir(out_dir)?;
        let n = table::next_seq(out_dir, EXTRACTED_PREFIX, "csv")
            .max(table::next_seq(out_dir, EXTRACTED_PREFIX, "log"));
        let csv_path = table::seq_path(out_dir, EXTRACTED_PREFIX, n, "csv");
        let log_path = table::seq_path(out_dir, EXTRACTED_PREFIX, n, "log");

        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(table::create_output(&csv_path)?);
        wtr.write_record(EXTRACTED_HEADERS)
            .map_err(|e| csv_write_err(&csv_path, e))?;
        let mut log = CrawlLog::create(&log_path)?;

        let total = urls.len();
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );

        let mut ok = 0usize;
        let mut errors = 0usize;

        for url in urls {
            let (record, entry) = self.process_one(url);
            log.append(&entry)?;
            match record {
                Some(r) => {
                    wtr.serialize(&r).map_err(|e| csv_write_err(&csv_path, e))?;
                    ok += 1;
                }
                None => errors += 1,
            }
            pb.inc(1);
        }

        pb.finish_and_clear();
        wtr.flush().map_err(|source| PipelineError::OutputLocked {
            path: csv_path.clone(),
            source,
        })?;
        let log_path = log.finish()?;

        let stats = CrawlStats {
            total,
            ok,
            errors,
        };
        info!("Crawled {} urls ({} ok, {} errors)", stats.total, stats.ok, stats.errors);

        Ok(CrawlOutput {
            stats,
            extracted: csv_path,
            log: log_path,
        })
    }

    fn process_one(&mut self, url: &str) -> (Option<ExtractedRecord>, LogEntry) {
        let start = Instant::now();
        let mut status = None;
        let result = self.fetch(url).and_then(|page| {
            status = page.status;
            parser::extract_record(&page.body)
        });
        if let Err(FetchError::Status(code)) = &result {
            status = Some(*code);
        }

        let (record, outcome, error) = match result {
            Ok(r) => {
                debug!("{} -> numero={} valor={}", url, r.numero, r.valor_pagar);
                (Some(r), Outcome::Ok, None)
            }
            Err(e) => {
                warn!("Failed {}: {}", url, e);
                (None, Outcome::Fail, Some(e.to_string()))
            }
        };

        let entry = LogEntry {
            at: Local::now(),
            url: url.to_string(),
            outcome,
            elapsed: start.elapsed(),
            status,
            error,
        };
        (record, entry)
    }

    fn fetch(&mut self, raw: &str) -> Result<Fetched, FetchError> {
        let normalized = links::normalize_url(raw);
        if normalized.is_empty() {
            return Err(FetchError::EmptyUrl);
        }
        if normalized
            .get(..FILE_SCHEME.len())
            .is_some_and(|s| s.eq_ignore_ascii_case(FILE_SCHEME))
        {
            return read_local(&normalized);
        }
        let url = Url::parse(&normalized)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", normalized, e)))?;

        match url.scheme() {
            "http" | "https" => self.fetch_http(url),
            other => Err(FetchError::InvalidUrl(format!("unsupported scheme {}", other))),
        }
    }

    fn fetch_http(&mut self, url: Url) -> Result<Fetched, FetchError> {
        let host = url.host_str().unwrap_or_default().to_string();
        self.throttle.wait(&host);

        let resp = self.client.get(url).send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();
        if !content_type.is_empty() && !content_type.contains("text") && !content_type.contains("html") {
            return Err(FetchError::NotHtml(content_type));
        }

        Ok(Fetched {
            body: resp.text()?,
            status: Some(status.as_u16()),
        })
    }
}

/// Saved pages (`file://`) are read from disk without throttling.
fn read_local(raw: &str) -> Result<Fetched, FetchError> {
    let path = local_path(raw);
    if !path.exists() {
        return Err(FetchError::FileNotFound(path));
    }
    let bytes = fs::read(&path).map_err(|source| FetchError::Io { path, source })?;
    Ok(Fetched {
        body: String::from_utf8_lossy(&bytes).into_owned(),
        status: None,
    })
}

/// `file:///abs/x.html` and `file://localhost/...` go through URL decoding.
/// Anything else after the scheme (`file://saved/x.html`) is a path relative
/// to the working directory.
fn local_path(raw: &str) -> PathBuf {
    if let Ok(url) = Url::parse(raw) {
        if matches!(url.host_str(), None | Some("") | Some("localhost")) {
            if let Ok(path) = url.to_file_path() {
                return path;
            }
        }
    }
    PathBuf::from(&raw[FILE_SCHEME.len()..])
}

fn csv_write_err(path: &Path, e: csv::Error) -> PipelineError {
    let source = match e.into_kind() {
        csv::ErrorKind::Io(io) => io,
        other => std::io::Error::other(format!("{:?}", other)),
    };
    PipelineError::OutputLocked {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method, MockServer};

    const ALMOCO: &str = include_str!("../tests/fixtures/nfce_almoco.html");
    const HOTEL: &str = include_str!("../tests/fixtures/nfce_hotel.html");

    fn settings() -> Settings {
        Settings {
            delay: 0.0,
            timeout: 5,
            ..Settings::default()
        }
    }

    fn serve(server: &MockServer, path: &str, status: u16, body: &str) {
        server.mock(|when, then| {
            when.method(Method::GET).path(path);
            then.status(status)
                .header("content-type", "text/html; charset=utf-8")
                .body(body);
        });
    }

    fn read_extracted(path: &Path) -> Vec<ExtractedRecord> {
        csv::Reader::from_path(path)
            .unwrap()
            .deserialize()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn mixed_success_and_failures() {
        let server = MockServer::start();
        serve(&server, "/almoco", 200, ALMOCO);
        serve(&server, "/hotel", 200, HOTEL);
        serve(&server, "/gone", 404, "not here");
        serve(&server, "/blank", 200, "<html><body>manutencao</body></html>");

        let urls = vec![
            server.url("/almoco"),
            server.url("/gone"),
            "http://".to_string(),
            server.url("/hotel"),
            server.url("/blank"),
            server.url("/almoco"),
        ];
        let dir = tempfile::tempdir().unwrap();
        let out = Crawler::new(&settings()).unwrap().crawl(&urls, dir.path()).unwrap();

        assert_eq!(out.stats.total, 6);
        assert_eq!(out.stats.ok, 3);
        assert_eq!(out.stats.errors, 3);
        assert_eq!(out.stats.ok + out.stats.errors, urls.len());

        let rows = read_extracted(&out.extracted);
        let numbers: Vec<&str> = rows.iter().map(|r| r.numero.as_str()).collect();
        assert_eq!(numbers, vec!["123", "4567", "123"]);
        assert_eq!(rows[0], rows[2]);

        let log = fs::read_to_string(&out.log).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[1].contains("\tFAIL\t") && lines[1].contains("HTTP status 404"));
        assert!(lines[2].contains("invalid url"));
        assert!(lines[4].contains("field not found on page: numero"));
        assert_eq!(lines.iter().filter(|l| l.contains("\tOK\t")).count(), 3);
    }

    #[test]
    fn empty_input_creates_empty_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let out = Crawler::new(&settings()).unwrap().crawl(&[], dir.path()).unwrap();
        assert_eq!(out.stats, CrawlStats { total: 0, ok: 0, errors: 0 });
        assert_eq!(fs::read_to_string(&out.extracted).unwrap(), "numero,emissao,valor_pagar\n");
        assert_eq!(fs::read_to_string(&out.log).unwrap(), "");
    }

    #[test]
    fn reruns_are_numbered_and_identical() {
        let server = MockServer::start();
        serve(&server, "/a", 200, ALMOCO);
        serve(&server, "/b", 200, HOTEL);
        let urls = vec![server.url("/a"), server.url("/b")];
        let dir = tempfile::tempdir().unwrap();

        let mut crawler = Crawler::new(&settings()).unwrap();
        let first = crawler.crawl(&urls, dir.path()).unwrap();
        let second = crawler.crawl(&urls, dir.path()).unwrap();

        assert!(first.extracted.ends_with("extraidos-1.csv"));
        assert!(second.extracted.ends_with("extraidos-2.csv"));
        assert!(second.log.ends_with("extraidos-2.log"));
        assert_eq!(
            fs::read_to_string(&first.extracted).unwrap(),
            fs::read_to_string(&second.extracted).unwrap()
        );
    }

    #[test]
    fn rejects_non_html_content() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(Method::GET).path("/pdf");
            then.status(200).header("content-type", "application/pdf").body("%PDF-1.4");
        });
        let dir = tempfile::tempdir().unwrap();
        let out = Crawler::new(&settings())
            .unwrap()
            .crawl(&[server.url("/pdf")], dir.path())
            .unwrap();
        assert_eq!(out.stats.errors, 1);
        let log = fs::read_to_string(&out.log).unwrap();
        assert!(log.contains("unsupported content-type: application/pdf"));
    }

    #[test]
    fn reads_saved_pages_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let page = dir.path().join("nota.html");
        fs::write(&page, HOTEL).unwrap();
        let urls = vec![
            format!("file://{}", page.display()),
            format!("file://{}", dir.path().join("missing.html").display()),
        ];
        let out = Crawler::new(&settings())
            .unwrap()
            .crawl(&urls, &dir.path().join("outputs"))
            .unwrap();
        assert_eq!(out.stats.ok, 1);
        assert_eq!(read_extracted(&out.extracted)[0].numero, "4567");
        let log = fs::read_to_string(&out.log).unwrap();
        assert!(log.contains("file not found"));
    }

    #[test]
    fn relative_file_urls_resolve_against_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let urls = vec![
            "file://tests/fixtures/nfce_hotel.html".to_string(),
            "FILE://tests/fixtures/nfce_almoco.html".to_string(),
        ];
        let out = Crawler::new(&settings()).unwrap().crawl(&urls, dir.path()).unwrap();
        assert_eq!(out.stats.ok, 2);
        let numbers: Vec<String> = read_extracted(&out.extracted).into_iter().map(|r| r.numero).collect();
        assert_eq!(numbers, vec!["4567", "123"]);
    }

    #[cfg(unix)]
    #[test]
    fn local_path_forms() {
        assert_eq!(local_path("file:///tmp/a%20b.html"), PathBuf::from("/tmp/a b.html"));
        assert_eq!(local_path("file://localhost/tmp/a.html"), PathBuf::from("/tmp/a.html"));
        assert_eq!(local_path("file://saved/a.html"), PathBuf::from("saved/a.html"));
    }

    #[test]
    fn throttles_same_host() {
        let server = MockServer::start();
        serve(&server, "/a", 200, ALMOCO);
        let urls = vec![server.url("/a"), server.url("/a"), server.url("/a")];
        let dir = tempfile::tempdir().unwrap();
        let s = Settings {
            delay: 0.1,
            ..settings()
        };
        let t0 = Instant::now();
        let out = Crawler::new(&s).unwrap().crawl(&urls, dir.path()).unwrap();
        assert_eq!(out.stats.ok, 3);
        assert!(t0.elapsed() >= std::time::Duration::from_millis(200));
    }
}
