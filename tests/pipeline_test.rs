//! End-to-end pipeline tests against a local mock image host
//!
//! These tests drive the full chain — provider resolution, page fan-out,
//! retry, resumption, packaging and reporting — with wiremock standing in
//! for the remote image host.

use async_trait::async_trait;
use manga_dl::{
    Chapter, ChapterId, ChapterOutcome, Config, Event, MangaDownloader, MangaInfo, OutputFormat,
    PageRef, Provider, ProviderError, SearchResult,
};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestProvider {
    base: String,
    chapters: Vec<Chapter>,
}

#[async_trait]
impl Provider for TestProvider {
    fn id(&self) -> &str {
        "testsource"
    }

    fn name(&self) -> &str {
        "Test Source"
    }

    fn base_url(&self) -> &str {
        &self.base
    }

    async fn search(&self, _query: &str) -> Result<Vec<SearchResult>, ProviderError> {
        Ok(Vec::new())
    }

    async fn get_manga_info(&self, manga_id: &str) -> Result<MangaInfo, ProviderError> {
        Ok(manga_info(manga_id))
    }

    async fn get_chapters(&self, _manga_id: &str) -> Result<Vec<Chapter>, ProviderError> {
        Ok(self.chapters.clone())
    }

    async fn get_chapter_pages(&self, chapter: &Chapter) -> Result<Vec<PageRef>, ProviderError> {
        Ok(chapter.pages.clone())
    }
}

fn manga_info(manga_id: &str) -> MangaInfo {
    MangaInfo {
        provider_id: "testsource".to_string(),
        manga_id: manga_id.to_string(),
        title: "Test Manga".to_string(),
        alternative_titles: Vec::new(),
        cover_url: String::new(),
        url: String::new(),
        description: String::new(),
        authors: Vec::new(),
        artists: Vec::new(),
        genres: Vec::new(),
        status: "Ongoing".to_string(),
        year: None,
    }
}

fn chapter(server_uri: &str, number: u32, page_count: u32) -> Chapter {
    Chapter {
        chapter_id: ChapterId::new(format!("ch-{number}")),
        manga_id: "m1".to_string(),
        title: String::new(),
        chapter_number: number.to_string(),
        volume: None,
        url: format!("{server_uri}/chapter/{number}"),
        release_date: None,
        language: "en".to_string(),
        scanlator: None,
        pages: (0..page_count)
            .map(|p| PageRef::new(format!("{server_uri}/ch{number}/{p}.jpg"), p))
            .collect(),
    }
}

fn test_config(download_dir: &Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = download_dir.to_path_buf();
    config.download.max_chapter_workers = 2;
    config.download.max_page_workers = 4;
    config.retry.max_attempts = 2;
    config.retry.initial_delay = Duration::from_millis(10);
    config.retry.max_delay = Duration::from_millis(50);
    config.retry.jitter = false;
    config.rate_limit.requests_per_second = 0.0;
    config.rate_limit.max_in_flight = 8;
    config
}

async fn mount_page(server: &MockServer, chapter: u32, page: u32, delay_ms: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/ch{chapter}/{page}.jpg")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(format!("ch{chapter}-page{page}").into_bytes())
                .set_delay(Duration::from_millis(delay_ms)),
        )
        .mount(server)
        .await;
}

async fn downloader_with(
    config: Config,
    server_uri: &str,
    chapters: Vec<Chapter>,
) -> (MangaDownloader, Arc<dyn Provider>) {
    let downloader = MangaDownloader::new(config).unwrap();
    let provider: Arc<dyn Provider> = Arc::new(TestProvider {
        base: server_uri.to_string(),
        chapters,
    });
    downloader.register_provider(provider.clone()).await;
    (downloader, provider)
}

fn part_files_under(dir: &Path) -> Vec<std::path::PathBuf> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.extension().map(|e| e == "part").unwrap_or(false))
        .collect()
}

#[tokio::test]
async fn full_run_packages_every_chapter() {
    let server = MockServer::start().await;
    for ch in 1..=3 {
        for p in 0..3 {
            mount_page(&server, ch, p, 0).await;
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let chapters: Vec<Chapter> = (1..=3).map(|n| chapter(&server.uri(), n, 3)).collect();
    let (downloader, provider) = downloader_with(config, &server.uri(), chapters.clone()).await;

    let report = downloader
        .download_chapters(provider, &manga_info("m1"), chapters)
        .await
        .unwrap();

    assert!(report.is_success(), "report: {report:?}");
    assert_eq!(report.completed(), 3);

    let manga_dir = dir.path().join("Test Manga");
    for ch in 1..=3 {
        let artifact = manga_dir.join(format!("Chapter {ch}.cbz"));
        assert!(artifact.exists(), "missing artifact for chapter {ch}");
        // delete_pages_after defaults to true: working dirs are gone
        assert!(!manga_dir.join(format!("Chapter {ch}")).exists());
    }
    assert!(part_files_under(dir.path()).is_empty());
}

#[tokio::test]
async fn shuffled_completion_still_yields_ordinal_order() {
    let server = MockServer::start().await;
    // Later pages answer faster, so completion order inverts ordinal order
    let delays = [120u64, 60, 20, 0];
    for (p, delay) in delays.iter().enumerate() {
        mount_page(&server, 1, p as u32, *delay).await;
    }

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let chapters = vec![chapter(&server.uri(), 1, 4)];
    let (downloader, provider) = downloader_with(config, &server.uri(), chapters.clone()).await;

    let report = downloader
        .download_chapters(provider, &manga_info("m1"), chapters)
        .await
        .unwrap();
    assert_eq!(report.completed(), 1, "report: {report:?}");

    let artifact = dir.path().join("Test Manga/Chapter 1.cbz");
    let file = std::fs::File::open(&artifact).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();

    for (i, expected) in ["001.jpg", "002.jpg", "003.jpg", "004.jpg"]
        .iter()
        .enumerate()
    {
        let mut entry = archive.by_index(i).unwrap();
        assert_eq!(entry.name(), *expected, "entry {i} out of order");
        let mut contents = String::new();
        entry.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, format!("ch1-page{i}"), "page payload mismatch");
    }
}

#[tokio::test]
async fn second_run_skips_without_touching_the_network() {
    let server = MockServer::start().await;
    for p in 0..2 {
        mount_page(&server, 1, p, 0).await;
    }

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let chapters = vec![chapter(&server.uri(), 1, 2)];
    let (downloader, provider) = downloader_with(config, &server.uri(), chapters.clone()).await;

    let first = downloader
        .download_chapters(provider.clone(), &manga_info("m1"), chapters.clone())
        .await
        .unwrap();
    assert_eq!(first.completed(), 1);

    let requests_after_first = server.received_requests().await.unwrap().len();
    assert_eq!(requests_after_first, 2);

    let second = downloader
        .download_chapters(provider, &manga_info("m1"), chapters)
        .await
        .unwrap();
    assert_eq!(second.skipped(), 1, "report: {second:?}");
    assert!(second.is_success());

    let requests_after_second = server.received_requests().await.unwrap().len();
    assert_eq!(
        requests_after_second, requests_after_first,
        "a skipped chapter must make zero requests"
    );
}

#[tokio::test]
async fn one_bad_page_withholds_only_that_chapter() {
    let server = MockServer::start().await;
    // Chapter 1 is fine, chapter 2 has a permanently missing page
    for p in 0..2 {
        mount_page(&server, 1, p, 0).await;
    }
    mount_page(&server, 2, 0, 0).await;
    Mock::given(method("GET"))
        .and(path("/ch2/1.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let chapters = vec![
        chapter(&server.uri(), 1, 2),
        chapter(&server.uri(), 2, 2),
    ];
    let (downloader, provider) = downloader_with(config, &server.uri(), chapters.clone()).await;

    let report = downloader
        .download_chapters(provider, &manga_info("m1"), chapters)
        .await
        .unwrap();

    assert_eq!(report.completed(), 1);
    assert_eq!(report.partial(), 1);
    assert!(!report.is_success());
    assert_eq!(report.retryable(), vec![ChapterId::new("ch-2")]);

    let manga_dir = dir.path().join("Test Manga");
    assert!(manga_dir.join("Chapter 1.cbz").exists());
    assert!(
        !manga_dir.join("Chapter 2.cbz").exists(),
        "a partially failed chapter must never be packaged"
    );
    assert!(
        manga_dir.join("Chapter 2/001.jpg").exists(),
        "fetched pages of a partial chapter are retained for resumption"
    );

    let partial = report
        .chapters
        .iter()
        .find(|c| c.chapter_id == ChapterId::new("ch-2"))
        .unwrap();
    assert_eq!(
        partial.outcome,
        ChapterOutcome::PartiallyFailed { missing: vec![1] }
    );
}

#[tokio::test]
async fn transient_failures_are_bounded_by_retry_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ch1/0.jpg"))
        .respond_with(ResponseTemplate::new(503))
        // max_attempts=2 means initial + 2 retries = 3 requests, never more
        .expect(3)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let chapters = vec![chapter(&server.uri(), 1, 1)];
    let (downloader, provider) = downloader_with(config, &server.uri(), chapters.clone()).await;

    let report = downloader
        .download_chapters(provider, &manga_info("m1"), chapters)
        .await
        .unwrap();

    assert_eq!(report.failed(), 1, "report: {report:?}");
    // Mock expectation (exactly 3 requests) is verified on server drop
}

#[tokio::test]
async fn cancellation_stops_the_run_and_leaves_no_temp_files() {
    let server = MockServer::start().await;
    for ch in 1..=5 {
        for p in 0..2 {
            mount_page(&server, ch, p, 200).await;
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let chapters: Vec<Chapter> = (1..=5).map(|n| chapter(&server.uri(), n, 2)).collect();
    let (downloader, provider) = downloader_with(config, &server.uri(), chapters.clone()).await;

    let canceller = downloader.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let report = downloader
        .download_chapters(provider, &manga_info("m1"), chapters)
        .await
        .unwrap();

    assert_eq!(report.chapters.len(), 5, "every chapter must be reported");
    assert!(
        report.cancelled() > 0,
        "slow pages plus early cancel should interrupt chapters: {report:?}"
    );
    assert!(!report.is_success());

    for chapter_report in &report.chapters {
        if chapter_report.outcome == ChapterOutcome::Cancelled {
            assert!(chapter_report.artifact.is_none());
        }
    }
    assert!(
        part_files_under(dir.path()).is_empty(),
        "cancellation must not leave temp files behind"
    );
}

#[tokio::test]
async fn download_manga_routes_through_registry_and_range() {
    let server = MockServer::start().await;
    for ch in 1..=3 {
        mount_page(&server, ch, 0, 0).await;
    }

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let chapters: Vec<Chapter> = (1..=3).map(|n| chapter(&server.uri(), n, 1)).collect();
    let (downloader, _provider) = downloader_with(config, &server.uri(), chapters).await;

    let report = downloader
        .download_manga(
            Some("testsource"),
            &manga_dl::MangaSelector::Id("m1".to_string()),
            Some("1-2"),
        )
        .await
        .unwrap();

    assert_eq!(report.chapters.len(), 2, "range 1-2 selects two chapters");
    assert_eq!(report.completed(), 2);

    let manga_dir = dir.path().join("Test Manga");
    assert!(manga_dir.join("Chapter 1.cbz").exists());
    assert!(manga_dir.join("Chapter 2.cbz").exists());
    assert!(!manga_dir.join("Chapter 3.cbz").exists());
}

#[tokio::test]
async fn events_track_the_chapter_lifecycle() {
    let server = MockServer::start().await;
    for p in 0..2 {
        mount_page(&server, 1, p, 0).await;
    }

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let chapters = vec![chapter(&server.uri(), 1, 2)];
    let (downloader, provider) = downloader_with(config, &server.uri(), chapters.clone()).await;

    let mut events = downloader.subscribe();

    downloader
        .download_chapters(provider, &manga_info("m1"), chapters)
        .await
        .unwrap();

    let mut saw_started = false;
    let mut progress_total = 0;
    let mut saw_completed = false;
    let mut saw_run_finished = false;

    while let Ok(event) = events.try_recv() {
        match event {
            Event::ChapterStarted { pages, .. } => {
                saw_started = true;
                assert_eq!(pages, 2);
            }
            Event::PageProgress { completed, total, .. } => {
                progress_total = progress_total.max(completed);
                assert_eq!(total, 2);
            }
            Event::ChapterCompleted { artifact, .. } => {
                saw_completed = true;
                assert!(artifact.to_string_lossy().ends_with("Chapter 1.cbz"));
            }
            Event::RunFinished { completed, .. } => {
                saw_run_finished = true;
                assert_eq!(completed, 1);
            }
            _ => {}
        }
    }

    assert!(saw_started, "ChapterStarted must be emitted");
    assert_eq!(progress_total, 2, "progress must reach the page total");
    assert!(saw_completed, "ChapterCompleted must be emitted");
    assert!(saw_run_finished, "RunFinished must be emitted");
}

#[tokio::test]
async fn empty_chapter_fails_cleanly() {
    let server = MockServer::start().await;

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let chapters = vec![chapter(&server.uri(), 1, 0)];
    let (downloader, provider) = downloader_with(config, &server.uri(), chapters.clone()).await;

    let report = downloader
        .download_chapters(provider, &manga_info("m1"), chapters)
        .await
        .unwrap();

    assert_eq!(report.failed(), 1, "report: {report:?}");
    assert!(!dir.path().join("Test Manga/Chapter 1.cbz").exists());
}

#[tokio::test]
async fn pdf_format_produces_document_artifact() {
    let server = MockServer::start().await;
    // Serve a real PNG so the document writer can decode it
    let png = {
        use printpdf::image_crate::{ImageBuffer, Rgb};
        let img = ImageBuffer::from_pixel(20, 30, Rgb::<u8>([10, 20, 30]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        img.write_to(&mut bytes, printpdf::image_crate::ImageOutputFormat::Png)
            .unwrap();
        bytes.into_inner()
    };
    Mock::given(method("GET"))
        .and(path("/ch1/0.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.output.format = OutputFormat::Pdf;

    let mut ch = chapter(&server.uri(), 1, 0);
    ch.pages = vec![PageRef::new(format!("{}/ch1/0.png", server.uri()), 0)];
    let chapters = vec![ch];
    let (downloader, provider) = downloader_with(config, &server.uri(), chapters.clone()).await;

    let report = downloader
        .download_chapters(provider, &manga_info("m1"), chapters)
        .await
        .unwrap();
    assert_eq!(report.completed(), 1, "report: {report:?}");

    let artifact = dir.path().join("Test Manga/Chapter 1.pdf");
    let bytes = std::fs::read(&artifact).unwrap();
    assert!(bytes.starts_with(b"%PDF"));
}

#[test]
fn invalid_configuration_is_rejected_up_front() {
    let mut config = Config::default();
    config.download.max_chapter_workers = 0;

    let result = MangaDownloader::new(config);
    assert!(matches!(
        result,
        Err(manga_dl::Error::Config { .. })
    ));
}
