use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use url::Url;

use site_translator::error::Result;
use site_translator::orchestrator::{
    JobDescriptor, JobStatus, JobUpdate, ProgressSink, TranslationOrchestrator,
};
use site_translator::storage::InMemoryStorage;
use site_translator::translator::{TranslationProvider, TranslationService};
use site_translator::web_crawler::{FetchedPage, PageFetcher, WebCrawler, WebCrawlerConfig};

const HOME: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>Welcome</title>
  <script>if (a < b) { console.log("Welcome"); }</script>
  <style>body > p { margin: 0; }</style>
</head>
<body>
  <p>Hello from the home page</p>
  <a href="/about">About the team</a>
  <a href="https://elsewhere.example/">Outside link here</a>
</body>
</html>"#;

const ABOUT: &str = r#"<html><head><title>About us</title></head>
<body><p>We build things with care</p><a href="/">Back home</a></body></html>"#;

struct StaticSite {
    pages: HashMap<String, String>,
}

impl StaticSite {
    fn new(pages: &[(&str, &str)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(url, html)| (url.to_string(), html.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl PageFetcher for StaticSite {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage> {
        match self.pages.get(url.as_str()) {
            Some(html) => Ok(FetchedPage::html(html.clone())),
            None => Ok(FetchedPage {
                status: 404,
                content_type: Some("text/html".to_string()),
                body: String::new(),
            }),
        }
    }
}

/// 词典翻译源，未命中的文本加上语言前缀
struct DictionaryProvider {
    entries: HashMap<&'static str, &'static str>,
    calls: AtomicUsize,
}

#[async_trait]
impl TranslationProvider for DictionaryProvider {
    fn id(&self) -> &str {
        "dictionary"
    }

    async fn translate_text(&self, text: &str, _source: &str, target: &str) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Some(
            self.entries
                .get(text)
                .map(|t| t.to_string())
                .unwrap_or_else(|| format!("{}:{}", target, text)),
        )
    }

    async fn check_availability(&self) -> bool {
        true
    }
}

#[derive(Default)]
struct RecordingSink {
    updates: Mutex<Vec<JobUpdate>>,
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn update(&self, update: JobUpdate) -> Result<()> {
        self.updates.lock().unwrap().push(update);
        Ok(())
    }
}

fn orchestrator(site: StaticSite, storage: Arc<InMemoryStorage>) -> TranslationOrchestrator {
    let provider = DictionaryProvider {
        entries: HashMap::from([("Welcome", "Bienvenido")]),
        calls: AtomicUsize::new(0),
    };
    let service = TranslationService::new(vec![Arc::new(provider) as Arc<dyn TranslationProvider>], 2);
    let crawler = WebCrawler::new(WebCrawlerConfig::default().delay_ms(0), Box::new(site));
    TranslationOrchestrator::new(crawler, Arc::new(service), storage)
}

fn read_archive(bytes: Vec<u8>) -> Vec<(String, String)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut file = archive.by_index(i).unwrap();
            let mut content = String::new();
            file.read_to_string(&mut content).unwrap();
            (file.name().to_string(), content)
        })
        .collect()
}

#[tokio::test]
async fn test_two_page_site_end_to_end() {
    let storage = Arc::new(InMemoryStorage::new());
    let site = StaticSite::new(&[
        ("https://example.com/", HOME),
        ("https://example.com/about", ABOUT),
    ]);
    let orchestrator = orchestrator(site, storage.clone());
    let sink = RecordingSink::default();
    let job = JobDescriptor::new("https://example.com", "en", "es").with_job_id("e2e");

    let report = orchestrator.run(&job, &sink).await.unwrap();
    assert_eq!(report.pages_total, 2);
    assert_eq!(report.pages_translated, 2);

    let (bytes, _) = storage.get("jobs/e2e/translated-site.zip").unwrap();
    let entries = read_archive(bytes);
    let names: Vec<&str> = entries.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["index.html", "about.html"]);

    let index = &entries[0].1;
    assert!(index.contains("<title>Bienvenido</title>"));
    assert!(index.contains("es:Hello from the home page"));
    assert!(index.contains(r#"<script>if (a < b) { console.log("Welcome"); }</script>"#));
    assert!(index.contains("<style>body > p { margin: 0; }</style>"));
    assert!(index.contains(r#"<html lang="es">"#));

    let about = &entries[1].1;
    assert!(about.contains("<title>es:About us</title>"));

    let updates = sink.updates.lock().unwrap();
    assert!(updates.windows(2).all(|w| w[0].progress <= w[1].progress));
    let last = updates.last().unwrap();
    assert_eq!(last.status, JobStatus::Completed);
    assert_eq!(last.progress, 100);
    assert_eq!(
        last.result_location.as_deref(),
        Some("memory://jobs/e2e/translated-site.zip")
    );
}

#[tokio::test]
async fn test_archive_has_one_entry_per_page() {
    let storage = Arc::new(InMemoryStorage::new());
    let site = StaticSite::new(&[
        (
            "https://example.com/",
            r#"<html><body><a href="/docs/">Documentation</a><a href="/blog">Company blog</a></body></html>"#,
        ),
        ("https://example.com/docs", "<html><body><p>Docs content</p></body></html>"),
        ("https://example.com/blog", "<html><body><p>Blog content</p></body></html>"),
    ]);
    let orchestrator = orchestrator(site, storage.clone());
    let job = JobDescriptor::new("https://example.com/", "en", "fr").with_job_id("three");

    orchestrator.run(&job, &RecordingSink::default()).await.unwrap();

    let (bytes, _) = storage.get("jobs/three/translated-site.zip").unwrap();
    let names: Vec<String> = read_archive(bytes).into_iter().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["index.html", "docs.html", "blog.html"]);
}

#[tokio::test]
async fn test_page_limit_bounds_the_crawl() {
    let storage = Arc::new(InMemoryStorage::new());
    let site = StaticSite::new(&[
        ("https://example.com/", HOME),
        ("https://example.com/about", ABOUT),
    ]);
    let orchestrator = orchestrator(site, storage.clone());
    let job = JobDescriptor::new("https://example.com/", "en", "de")
        .with_job_id("one")
        .with_page_limit(1);

    let report = orchestrator.run(&job, &RecordingSink::default()).await.unwrap();
    assert_eq!(report.pages_total, 1);

    let (bytes, _) = storage.get("jobs/one/translated-site.zip").unwrap();
    assert_eq!(read_archive(bytes).len(), 1);
}

#[tokio::test]
async fn test_unreachable_site_fails_without_archive() {
    let storage = Arc::new(InMemoryStorage::new());
    let orchestrator = orchestrator(StaticSite::new(&[]), storage.clone());
    let sink = RecordingSink::default();
    let job = JobDescriptor::new("https://example.com/", "en", "es");

    assert!(orchestrator.run(&job, &sink).await.is_err());
    assert!(storage.is_empty());

    let updates = sink.updates.lock().unwrap();
    assert_eq!(updates.last().unwrap().status, JobStatus::Failed);
}

#[tokio::test]
async fn test_query_pages_get_distinct_archive_entries() {
    let storage = Arc::new(InMemoryStorage::new());
    let site = StaticSite::new(&[
        (
            "https://example.com/",
            r#"<html><body><a href="/index.html">Home copy</a><a href="/news/?page=1">First news page</a><a href="/news?page=2">Second news page</a><a href="/guide.html">Read the guide</a></body></html>"#,
        ),
        ("https://example.com/index.html", "<html><body><p>Home copy content</p></body></html>"),
        ("https://example.com/news?page=1", "<html><body><p>Older news items</p></body></html>"),
        ("https://example.com/news?page=2", "<html><body><p>Newer news items</p></body></html>"),
        ("https://example.com/guide.html", "<html><body><p>Guide content</p></body></html>"),
    ]);
    let orchestrator = orchestrator(site, storage.clone());
    let job = JobDescriptor::new("https://example.com/", "en", "es").with_job_id("query");

    let report = orchestrator.run(&job, &RecordingSink::default()).await.unwrap();
    assert_eq!(report.pages_total, 5);

    let (bytes, _) = storage.get("jobs/query/translated-site.zip").unwrap();
    let entries = read_archive(bytes);
    let names: Vec<&str> = entries.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "index.html",
            "index-2.html",
            "news__page-1.html",
            "news__page-2.html",
            "guide.html"
        ]
    );
    assert!(entries[2].1.contains("es:Older news items"));
    assert!(entries[3].1.contains("es:Newer news items"));
}
