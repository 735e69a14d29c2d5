//! Unit tests for the session transcript.

use crate::session::domain::Transcript;
use eyre::ensure;
use tokio::sync::broadcast::error::RecvError;

#[tokio::test(flavor = "multi_thread")]
async fn live_subscriber_receives_lines_in_order() -> eyre::Result<()> {
    let transcript = Transcript::new(16);
    let mut feed = transcript.subscribe();

    transcript.append("first");
    transcript.append("second");

    ensure!(feed.recv().await? == "first");
    ensure!(feed.recv().await? == "second");
    ensure!(transcript.snapshot() == vec!["first".to_owned(), "second".to_owned()]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_subscriber_lags_but_snapshot_retains_the_lines() -> eyre::Result<()> {
    let transcript = Transcript::new(2);
    let mut feed = transcript.subscribe();

    for index in 0..5 {
        transcript.append(format!("line-{index}"));
    }

    ensure!(matches!(feed.recv().await, Err(RecvError::Lagged(_))));
    ensure!(transcript.len() == 5);
    ensure!(transcript.last_line() == Some("line-4".to_owned()));
    Ok(())
}

#[test]
fn retained_ring_drops_the_oldest_lines_once_full() {
    let transcript = Transcript::new(4);
    let overflow = 5;
    for index in 0..Transcript::RETAINED_LINE_LIMIT + overflow {
        transcript.append(format!("line-{index}"));
    }

    assert_eq!(transcript.len(), Transcript::RETAINED_LINE_LIMIT);
    let snapshot = transcript.snapshot();
    assert_eq!(snapshot.first().map(String::as_str), Some("line-5"));
    assert_eq!(
        transcript.last_line(),
        Some(format!(
            "line-{}",
            Transcript::RETAINED_LINE_LIMIT + overflow - 1
        ))
    );
}

#[test]
fn snapshot_of_empty_transcript_is_empty() {
    let transcript = Transcript::default();
    assert!(transcript.is_empty());
    assert!(transcript.snapshot().is_empty());
    assert!(transcript.last_line().is_none());
}
