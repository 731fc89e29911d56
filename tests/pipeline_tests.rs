//! End-to-end pipeline tests over recorded pages
//!
//! Every test drives the real processors through the session supervisor
//! against a [`FixturePageSource`], so search, validation, variant
//! enumeration, extraction, outlier filtering and aggregation all run.

use price_harvester_lib::application::{
    CheckpointManager, HarvestRun, LaunchHarvester, ModelProcessor, PriceHarvester, QueryGenerator, ResumeMode,
    RunSignals, SessionSupervisor, Supervised,
};
use price_harvester_lib::domain::{
    Availability, LaunchAvailability, LaunchRecord, ModelOutcome, ModelQuery, ModelRecord, PageError, RecordStatus,
};
use price_harvester_lib::infrastructure::checkpoint_store::FileProgressStore;
use price_harvester_lib::infrastructure::config::{AppConfig, SessionConfig};
use price_harvester_lib::infrastructure::site_profiles::SiteProfile;
use price_harvester_lib::test_utils::FixturePageSource;

const P15_128: &str = "https://www.flipkart.com/apple-iphone-15-black-128-gb/p/itm1";
const P15_256: &str = "https://www.flipkart.com/apple-iphone-15-black-256-gb/p/itm2?pid=2";
const P15_PLUS: &str = "https://www.flipkart.com/apple-iphone-15-plus-blue-128-gb/p/itm3";
const P15_CASE: &str = "https://www.flipkart.com/iphone-15-back-cover/p/itm4";
const P15_LAPTOP: &str = "https://www.flipkart.com/apple-iphone-15-black-128-gb-laptop/p/itm5";

fn product_page(title: &str, crumbs: &[&str], price: &str, mrp: &str, variants: &[(&str, &str)]) -> String {
    let crumbs: String = crumbs.iter().map(|c| format!("<a href=\"/\">{c}</a>")).collect();
    let variants: String = variants
        .iter()
        .map(|(label, href)| format!("<li class=\"aJWdJI\"><a href=\"{href}\">{label}</a></li>"))
        .collect();
    format!(
        r#"<html><body>
             <div class="r2CdBx">{crumbs}</div>
             <h1><span class="VU-ZEz">{title}</span></h1>
             <div class="Nx9bqj CxhGGd">{price}</div>
             <div class="yRaY8j">{mrp}</div>
             <div class="Z8JjpR">In stock</div>
             <ul>{variants}</ul>
           </body></html>"#
    )
}

fn session_config() -> SessionConfig {
    SessionConfig {
        restart_base_delay_ms: 1,
        restart_max_delay_ms: 2,
        ..SessionConfig::default()
    }
}

fn price_harvester() -> PriceHarvester {
    PriceHarvester::new(SiteProfile::builtin("flipkart").unwrap(), &AppConfig::default())
}

fn query(name: &str) -> ModelQuery {
    ModelQuery::from_name(name).unwrap()
}

fn iphone_source() -> FixturePageSource {
    // the first variant link points back at the candidate page itself
    let variants = [
        ("128 GB", "/apple-iphone-15-black-128-gb/p/itm1?pid=1"),
        ("256 GB", "/apple-iphone-15-black-256-gb/p/itm2?pid=2"),
    ];
    let mobiles = ["Home", "Mobiles & Accessories", "Mobiles"];

    FixturePageSource::new("flipkart")
        .with_search(
            "Apple iPhone 15",
            &[
                ("Apple iPhone 15 (Black, 128 GB)", P15_128),
                ("Apple iPhone 15 Plus (Blue, 128 GB)", P15_PLUS),
                ("Apple iPhone 15 Back Cover", P15_CASE),
                ("Apple iPhone 15 (Black, 128 GB)", P15_LAPTOP),
            ],
        )
        .with_page(P15_128, &product_page("Apple iPhone 15 (Black, 128 GB)", &mobiles, "₹69,900", "₹79,900", &variants))
        .with_page(P15_256, &product_page("Apple iPhone 15 (Black, 256 GB)", &mobiles, "₹79,900", "₹84,900", &variants))
        .with_page(P15_PLUS, &product_page("Apple iPhone 15 Plus (Blue, 128 GB)", &mobiles, "₹79,900", "₹89,900", &[]))
        .with_page(P15_CASE, &product_page("Apple iPhone 15 Back Cover", &["Home", "Accessories"], "₹4,999", "", &[]))
        .with_page(
            P15_LAPTOP,
            &product_page("Apple iPhone 15 (Black, 128 GB)", &["Home", "Computers", "Laptops"], "₹9,999", "", &[]),
        )
}

#[tokio::test]
async fn test_price_range_across_variants() {
    let source = iphone_source();
    let recorder = source.recorder();
    let mut supervisor = SessionSupervisor::new(Box::new(source), &session_config(), 0);

    let outcome = supervisor.run_model(&price_harvester(), &query("Apple iPhone 15")).await;
    let Supervised::Completed(ModelOutcome::Found(result)) = outcome else {
        panic!("expected a found outcome, got {outcome:?}");
    };

    assert_eq!(result.low_price, 69_900);
    assert_eq!(result.high_price, 79_900);
    assert_eq!(result.max_reference_price, Some(84_900));
    assert_eq!(result.representative_url, P15_128);
    assert_eq!(result.availability, Availability::InStock);
    assert_eq!(result.search_urls, vec!["fixture://flipkart/search?q=apple+iphone+15".to_string()]);

    // the Plus variant and the accessory are rejected on the search page
    let opened = recorder.opened();
    assert!(!opened.iter().any(|u| u == P15_PLUS || u == P15_CASE));
    // the laptop page is opened but rejected on its breadcrumbs
    assert!(opened.iter().any(|u| u == P15_LAPTOP));
}

#[tokio::test]
async fn test_variant_page_without_title_uses_candidate_title() {
    let candidate = "https://www.flipkart.com/pixel-8/p/a";
    let variant = "https://www.flipkart.com/pixel-8-256/p/b";
    let source = FixturePageSource::new("flipkart")
        .with_search("Google Pixel 8", &[("Google Pixel 8 (Obsidian, 128 GB)", candidate)])
        .with_page(
            candidate,
            &product_page("Google Pixel 8 (Obsidian, 128 GB)", &[], "₹75,999", "₹82,999", &[("128 GB", "/pixel-8/p/a"), ("256 GB", "/pixel-8-256/p/b")]),
        )
        .with_page(variant, r#"<html><body><div class="Nx9bqj">₹82,999</div></body></html>"#);
    let recorder = source.recorder();

    let mut supervisor = SessionSupervisor::new(Box::new(source), &session_config(), 0);
    let outcome = supervisor.run_model(&price_harvester(), &query("Google Pixel 8")).await;
    let Supervised::Completed(ModelOutcome::Found(result)) = outcome else {
        panic!("expected a found outcome, got {outcome:?}");
    };

    assert!(recorder.opened().iter().any(|u| u == variant));
    assert_eq!((result.low_price, result.high_price), (75_999, 82_999));
}

#[tokio::test]
async fn test_priceless_page_is_snapshotted() {
    let url = "https://www.flipkart.com/nothing-phone-2/p/a";
    let source = FixturePageSource::new("flipkart")
        .with_search("Nothing Phone 2", &[("Nothing Phone (2) (Dark Grey, 256 GB)", url)])
        .with_page(url, r#"<html><body><h1>Nothing Phone (2) (Dark Grey, 256 GB)</h1><p>Coming soon</p></body></html>"#);
    let recorder = source.recorder();

    let mut supervisor = SessionSupervisor::new(Box::new(source), &session_config(), 0);
    let outcome = supervisor.run_model(&price_harvester(), &query("Nothing Phone 2")).await;

    assert!(matches!(outcome, Supervised::Completed(ModelOutcome::NotFound { .. })), "{outcome:?}");
    assert_eq!(recorder.snapshots(), vec![url.to_string()]);
}

#[tokio::test]
async fn test_representative_url_is_first_accepted_candidate() {
    let page = |title: &str, price: &str| {
        format!(r#"<html><body><h1>{title}</h1><div class="Nx9bqj">{price}</div></body></html>"#)
    };
    let first = "https://www.flipkart.com/moto-g54/p/a";
    let source = FixturePageSource::new("flipkart")
        .with_search(
            "Motorola G54",
            &[
                ("Motorola G54 5G (Mint Green, 128 GB)", first),
                ("Motorola G54 5G (Pearl Blue, 256 GB)", "https://www.flipkart.com/moto-g54/p/b"),
                ("Motorola G54 5G (Midnight Blue, 256 GB)", "https://www.flipkart.com/moto-g54/p/c"),
            ],
        )
        .with_page(first, &page("Motorola G54 5G (Mint Green, 128 GB)", "₹4,499"))
        .with_page("https://www.flipkart.com/moto-g54/p/b", &page("Motorola G54 5G (Pearl Blue, 256 GB)", "₹15,999"))
        .with_page("https://www.flipkart.com/moto-g54/p/c", &page("Motorola G54 5G (Midnight Blue, 256 GB)", "₹16,999"));

    let mut supervisor = SessionSupervisor::new(Box::new(source), &session_config(), 0);
    let outcome = supervisor.run_model(&price_harvester(), &query("Motorola G54")).await;
    let Supervised::Completed(ModelOutcome::Found(result)) = outcome else {
        panic!("expected a found outcome, got {outcome:?}");
    };

    // the first candidate's price is an outlier, its URL still represents the model
    assert_eq!(result.low_price, 15_999);
    assert_eq!(result.representative_url, first);
}

#[tokio::test]
async fn test_low_outlier_is_dropped() {
    let page = |title: &str, price: &str| {
        format!(r#"<html><body><h1>{title}</h1><div class="Nx9bqj">{price}</div></body></html>"#)
    };
    let source = FixturePageSource::new("flipkart")
        .with_search(
            "Redmi Note 13",
            &[
                ("Redmi Note 13 5G (Arctic White, 128 GB)", "https://www.flipkart.com/redmi-note-13/p/a"),
                ("Redmi Note 13 5G (Prism Gold, 256 GB)", "https://www.flipkart.com/redmi-note-13/p/b"),
                ("Redmi Note 13 5G (Midnight Black, 128 GB)", "https://www.flipkart.com/redmi-note-13/p/c"),
            ],
        )
        .with_page("https://www.flipkart.com/redmi-note-13/p/a", &page("Redmi Note 13 5G (Arctic White, 128 GB)", "₹17,999"))
        .with_page("https://www.flipkart.com/redmi-note-13/p/b", &page("Redmi Note 13 5G (Prism Gold, 256 GB)", "₹18,999"))
        .with_page("https://www.flipkart.com/redmi-note-13/p/c", &page("Redmi Note 13 5G (Midnight Black, 128 GB)", "₹4,499"));

    let mut supervisor = SessionSupervisor::new(Box::new(source), &session_config(), 0);
    let outcome = supervisor.run_model(&price_harvester(), &query("Redmi Note 13")).await;
    let Supervised::Completed(ModelOutcome::Found(result)) = outcome else {
        panic!("expected a found outcome, got {outcome:?}");
    };

    assert_eq!(result.low_price, 17_999);
    assert_eq!(result.high_price, 18_999);
    assert_eq!(result.max_reference_price, None);
    assert_eq!(result.availability, Availability::Unknown);
}

#[tokio::test]
async fn test_not_found_retries_with_search_hint() {
    let mut supervisor = SessionSupervisor::new(Box::new(FixturePageSource::new("flipkart")), &session_config(), 0);
    let outcome = supervisor.run_model(&price_harvester(), &query("Nokia 3310 Classic")).await;

    let Supervised::Completed(ModelOutcome::NotFound { model, search_urls }) = outcome else {
        panic!("expected not found, got {outcome:?}");
    };
    assert_eq!(model, "Nokia 3310 Classic");
    assert_eq!(
        search_urls,
        vec![
            "fixture://flipkart/search?q=nokia+3310+classic".to_string(),
            "fixture://flipkart/search?q=nokia+3310+classic+mobile".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_search_timeouts_recover_with_one_restart() {
    let source = iphone_source();
    let search_url = source.search_url("Apple iPhone 15");
    source.fail_next(&search_url, PageError::timeout(&search_url, 20));
    source.fail_next(&search_url, PageError::timeout(&search_url, 20));
    let recorder = source.recorder();

    let mut supervisor = SessionSupervisor::new(Box::new(source), &session_config(), 0);
    let outcome = supervisor.run_model(&price_harvester(), &query("Apple iPhone 15")).await;

    assert!(matches!(outcome, Supervised::Completed(ModelOutcome::Found(_))));
    assert_eq!(recorder.resets(), 1);
    assert_eq!(supervisor.total_restarts(), 1);
}

#[tokio::test]
async fn test_unrecoverable_model_is_skipped_and_recorded() {
    let source = iphone_source();
    let search_url = source.search_url("Apple iPhone 15");
    for _ in 0..3 {
        source.fail_next(&search_url, PageError::Unresponsive("renderer crashed".into()));
    }

    let harvester = price_harvester();
    let mut supervisor = SessionSupervisor::new(Box::new(source), &session_config(), 0);
    let outcome = supervisor.run_model(&harvester, &query("Apple iPhone 15")).await;

    let Supervised::Skipped(error) = outcome else {
        panic!("expected a skip, got {outcome:?}");
    };
    let record = harvester.skipped("Apple iPhone 15", &error.to_string());
    assert_eq!(record.status(), RecordStatus::Skipped);
}

const S23: &str = "https://www.gsmarena.com/samsung_galaxy_s23-12082.php";
const S23_ULTRA: &str = "https://www.gsmarena.com/samsung_galaxy_s23_ultra-12024.php";
const S23_SPECS: &str = r#"<html><body>
    <h1 class="specs-phone-name-title">Samsung Galaxy S23</h1>
    <div id="specs-list">
      <table>
        <tr><th>Launch</th><td>Announced</td><td>2023, February 01</td></tr>
        <tr><td>Status</td><td>Available. Released 2023, February 17</td></tr>
      </table>
    </div>
  </body></html>"#;

fn launch_source() -> FixturePageSource {
    FixturePageSource::new("gsmarena")
        .with_search("Samsung Galaxy S23", &[("Samsung Galaxy S23 Ultra", S23_ULTRA), ("Samsung Galaxy S23", S23)])
        .with_page(S23, S23_SPECS)
        .with_search("Samsung Galaxy A99", &[("Samsung Galaxy A99", "https://www.gsmarena.com/a99.php")])
        .with_page("https://www.gsmarena.com/a99.php", "<html><body><div id=\"specs-list\">Rumored</div></body></html>")
}

#[tokio::test]
async fn test_launch_date_from_strict_match() {
    let harvester = LaunchHarvester::new(SiteProfile::builtin("gsmarena").unwrap(), &AppConfig::default().matching);
    let source = launch_source();

    let record = harvester.process(&source, &query("Samsung Galaxy S23")).await.unwrap();
    assert_eq!(record.launch_date.as_deref(), Some("2023, February 01"));
    assert_eq!(record.source.as_deref(), Some("GSMArena"));
    assert_eq!(record.url.as_deref(), Some(S23));
    assert_eq!(record.availability, LaunchAvailability::Found);

    let undated = harvester.process(&source, &query("Samsung Galaxy A99")).await.unwrap();
    assert_eq!(undated.availability, LaunchAvailability::NoExactDate);

    let missing = harvester.process(&source, &query("Samsung Galaxy Z9")).await.unwrap();
    assert_eq!(missing, LaunchRecord::new("Samsung Galaxy Z9", None, None, None));
    assert_eq!(missing.availability, LaunchAvailability::NotFound);
}

#[tokio::test]
async fn test_launch_dates_run_writes_table() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("launch_dates.csv");
    let checkpoint_path = dir.path().join("launch_dates.checkpoint.json");
    let models: Vec<String> = ["Samsung Galaxy S23", "Samsung Galaxy A99", "Samsung Galaxy Z9"]
        .iter()
        .map(|m| (*m).to_string())
        .collect();

    let store = FileProgressStore::<LaunchRecord>::new(&checkpoint_path).with_output(&output);
    let checkpoint = CheckpointManager::open(store, &models, Vec::new(), ResumeMode::Fresh, 100).await.unwrap();
    let harvester = LaunchHarvester::new(SiteProfile::builtin("gsmarena").unwrap(), &AppConfig::default().matching);
    let supervisor = SessionSupervisor::new(Box::new(launch_source()), &session_config(), 0);
    let mut run = HarvestRun::new(harvester, supervisor, checkpoint, QueryGenerator::new(""));

    let (_sender, mut signals) = RunSignals::channel();
    let summary = run.execute(&mut signals).await.unwrap();
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.found, 1);
    assert_eq!(summary.not_found, 2);
    assert!(!summary.interrupted);

    let table = std::fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines[0], "Model,Launch_Date,Launch_Source,Launch_URL,Launch_Availability,Scraped");
    assert_eq!(lines[1], format!("Samsung Galaxy S23,\"2023, February 01\",GSMArena,{S23},Found,Yes"));
    assert_eq!(lines[3], "Samsung Galaxy Z9,,,,NotFound,Yes");
    assert!(checkpoint_path.exists());
}
