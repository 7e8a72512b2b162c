// tests/adapters_fixtures.rs
//
// Offline parser checks for every source adapter, driven by recorded
// response bodies under tests/fixtures/.

use crypto_sentiment::batch::SourceId;
use crypto_sentiment::ingest::adapters::{bing, gnews, reddit, twitter};
use crypto_sentiment::ingest::types::FetchError;

fn fixture(name: &str) -> String {
    let path = format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"));
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("read {path}: {e}"))
}

#[test]
fn twitter_search_yields_one_document_per_tweet() {
    let env = twitter::parse_search_response(&fixture("twitter_search.json"), "BTC lang:en")
        .expect("parse twitter fixture");

    assert_eq!(env.source, SourceId::Twitter);
    assert_eq!(env.results.len(), 3);
    let first = &env.results[0].text;
    assert!(first.contains("bullish momentum into the weekend & strong"));
    assert_eq!(env.results[1].meta["author_id"], "1202");
    assert_eq!(env.results[2].meta["public_metrics"]["like_count"], 2);
    assert_eq!(env.meta["result_count"], 3);
    assert_eq!(env.meta["query"], "BTC lang:en");
}

#[test]
fn twitter_errors_next_to_data_fail_the_fetch() {
    let err = twitter::parse_search_response(&fixture("twitter_partial.json"), "BTC")
        .unwrap_err();
    match err {
        FetchError::PartialResponse {
            provider,
            errors,
            documents,
        } => {
            assert_eq!(provider, SourceId::Twitter);
            assert_eq!(documents, 1);
            assert_eq!(errors.len(), 1);
            assert!(errors[0].starts_with("Sorry, you are not authorized"));
        }
        other => panic!("expected PartialResponse, got {other:?}"),
    }
}

#[test]
fn twitter_garbage_is_malformed() {
    let err = twitter::parse_search_response("<html>rate limited</html>", "BTC").unwrap_err();
    assert!(matches!(err, FetchError::Malformed { provider: SourceId::Twitter, .. }));
    assert!(!err.is_transient());
}

#[test]
fn reddit_listing_joins_title_and_selftext() {
    let env = reddit::parse_search_response(&fixture("reddit_search.json"), "Bitcoin OR BTC")
        .expect("parse reddit fixture");

    let texts: Vec<&str> = env.results.iter().map(|d| d.text.as_str()).collect();
    assert_eq!(
        texts,
        vec![
            "Bitcoin rally looks healthy. Volume is up and the dip got bought fast.",
            "Is BTC a scam?",
            "Weekly BTC discussion. Post your thoughts here",
        ]
    );

    let first = &env.results[0].meta;
    assert_eq!(first["subreddit"], "CryptoCurrency");
    assert_eq!(first["num_comments"], 57);
    assert!(first.get("thumbnail").is_none(), "only whitelisted fields are kept");
    assert_eq!(env.meta["after"], "t3_1cqz9ab");
}

#[test]
fn reddit_error_body_is_a_failed_fetch() {
    let err = reddit::parse_search_response(r#"{"message":"Too Many Requests","error":429}"#, "q")
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(err.provider(), Some(SourceId::Reddit));
}

#[test]
fn bing_rss_items_are_truncated_to_limit() {
    let xml = fixture("bing_news.xml");

    let all = bing::parse_rss(&xml, "Bitcoin BTC", 10).expect("parse bing fixture");
    assert_eq!(all.results.len(), 3);
    assert_eq!(
        all.results[0].text,
        "Bitcoin climbs as ETF inflows return. Spot ETF demand pushed BTC higher on Monday."
    );
    assert_eq!(
        all.results[2].text,
        "What's next for Bitcoin? Analysts are split."
    );
    assert_eq!(
        all.results[0].meta["url"],
        "https://example.com/news/bitcoin-climbs"
    );
    assert_eq!(all.results[0].meta["published_at"], 1_715_589_000_i64);

    let two = bing::parse_rss(&xml, "Bitcoin BTC", 2).unwrap();
    assert_eq!(two.results.len(), 2);
    assert_eq!(two.meta["feed_items"], 3);
}

#[test]
fn gnews_articles_become_headline_documents() {
    let env = gnews::parse_search_response(&fixture("gnews_search.json"), "Bitcoin")
        .expect("parse gnews fixture");

    assert_eq!(env.results.len(), 2);
    assert_eq!(
        env.results[1].text,
        "Miners struggle after the halving. Revenue fell sharply, raising fears of capitulation."
    );
    assert_eq!(env.results[0].meta["publisher"], "Example Daily");
    assert_eq!(env.results[0].meta["published_at"], "2024-05-13T08:00:00Z");
    assert_eq!(env.meta["total_articles"], 2);
}

#[test]
fn gnews_error_object_fails_closed() {
    let err = gnews::parse_search_response(
        r#"{"errors":{"apikey":"You did not provide an API key."}}"#,
        "Bitcoin",
    )
    .unwrap_err();
    assert!(matches!(
        err,
        FetchError::PartialResponse { documents: 0, ref errors, .. } if errors.len() == 1
    ));
}
