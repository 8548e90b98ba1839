use super::mock::{page, MockElement, MockSession, MAIN};
use crate::discovery::{Discovery, FindOptions};
use crate::engine::Scope;
use crate::errors::AutomationError;
use crate::locator::Locator;
use std::time::Duration;

fn candidates() -> Vec<Locator> {
    vec![
        Locator::from("css:#connect"),
        Locator::from("button>>text=Connect"),
    ]
}

#[tokio::test]
async fn nested_frames_are_searched_before_the_main_document() {
    let session = MockSession::new("https://example.test/user/abc")
        .with_frames(MAIN, 2)
        .with(MockElement::new("top", MAIN, &candidates()))
        .with(MockElement::new("framed", MAIN, &candidates()).in_frame(1));

    let found = Discovery::new(&session)
        .find_in_page(&page(MAIN), &candidates(), FindOptions::immediate())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(found.element.handle, "framed");
    assert_eq!(found.element.scope, Scope::frame(page(MAIN), 1));
}

#[tokio::test]
async fn candidates_are_tried_in_priority_order() {
    let list = candidates();
    let session = MockSession::new("https://example.test/user/abc")
        .with(MockElement::new("by-text", MAIN, &list[1..]))
        .with(MockElement::new("by-css", MAIN, &list));

    let found = Discovery::new(&session)
        .find(&Scope::main(page(MAIN)), &list, FindOptions::waiting(Duration::from_millis(10)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.element.handle, "by-css");
    assert_eq!(found.locator, list[0]);
}

#[tokio::test]
async fn a_plain_miss_is_not_an_error() {
    let session = MockSession::new("https://example.test/user/abc").with_frames(MAIN, 1);
    let discovery = Discovery::new(&session);

    let found = discovery
        .find_in_page(&page(MAIN), &candidates(), FindOptions::immediate())
        .await
        .unwrap();
    assert!(found.is_none());

    let clicked = discovery
        .find_and_click(&page(MAIN), &candidates(), FindOptions::immediate())
        .await
        .unwrap();
    assert!(!clicked);
}

#[tokio::test]
async fn invalid_candidates_are_skipped() {
    let list = vec![Locator::from("Connect"), Locator::from("css:#connect")];
    let session = MockSession::new("https://example.test/user/abc")
        .with(MockElement::new("ok", MAIN, &list[1..]));

    let filled = Discovery::new(&session)
        .find_and_fill(&page(MAIN), &list, "hello", FindOptions::immediate())
        .await
        .unwrap();
    assert!(filled);
    assert_eq!(session.filled(), vec![("ok".to_string(), "hello".to_string())]);
}

#[tokio::test]
async fn action_failure_on_a_found_element_falls_through_then_surfaces() {
    let session = MockSession::new("https://example.test/user/abc")
        .with_frames(MAIN, 1)
        .with(
            MockElement::new("stale", MAIN, &candidates())
                .in_frame(0)
                .failing_click(AutomationError::ElementDetached("stale".to_string())),
        )
        .with(MockElement::new("live", MAIN, &candidates()));
    let discovery = Discovery::new(&session);

    // The frame's element fails, the main document's succeeds.
    assert!(discovery
        .find_and_click(&page(MAIN), &candidates(), FindOptions::immediate())
        .await
        .unwrap());
    assert!(session.clicked("stale") && session.clicked("live"));

    let only_stale = MockSession::new("https://example.test/user/abc").with(
        MockElement::new("stale", MAIN, &candidates())
            .failing_click(AutomationError::ElementDetached("stale".to_string())),
    );
    let err = Discovery::new(&only_stale)
        .find_and_click(&page(MAIN), &candidates(), FindOptions::immediate())
        .await
        .unwrap_err();
    assert!(matches!(err, AutomationError::ElementDetached(_)));
}

#[tokio::test]
async fn closed_page_surfaces_as_context_closed() {
    let session = MockSession::new("https://example.test/user/abc");
    let err = Discovery::new(&session)
        .find_in_page(&page("gone"), &candidates(), FindOptions::immediate())
        .await
        .unwrap_err();
    assert!(err.is_context_gone());
}
