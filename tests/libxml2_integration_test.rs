//! End-to-end operations through the dispatcher with the real libxml2/libxslt
//! engine, reading fixtures through `file:` URLs.

mod common;

use std::io::Write;

use serde_json::json;
use tempfile::NamedTempFile;

use common::{TestFixtures, libxml2_dispatcher, request};
use xml_worker::libxml2::XML_DECLARATION;
use xml_worker::{Operation, Request, Status};

#[tokio::test]
async fn test_validate_standalone_document() {
    let fixtures = TestFixtures::new();
    let dispatcher = libxml2_dispatcher();

    let reply = dispatcher
        .dispatch(
            Operation::Validate,
            &request(json!({"url_xml": fixtures.url("books_standalone_ok.xml")})),
        )
        .await;

    assert!(reply.is_ok(), "unexpected: {:?}", reply.message);
    assert_eq!(reply.output, None);
}

#[tokio::test]
async fn test_validate_against_external_dtd() {
    let fixtures = TestFixtures::new();
    let dispatcher = libxml2_dispatcher();

    let reply = dispatcher
        .dispatch(
            Operation::Validate,
            &request(json!({"url_xml": fixtures.url("books_dtd_ok.xml")})),
        )
        .await;

    assert!(reply.is_ok(), "unexpected: {:?}", reply.message);
}

#[tokio::test]
async fn test_validate_reports_dtd_violations() {
    let fixtures = TestFixtures::new();
    let dispatcher = libxml2_dispatcher();

    let reply = dispatcher
        .dispatch(
            Operation::Validate,
            &request(json!({"url_xml": fixtures.url("books_dtd_ko.xml")})),
        )
        .await;

    assert_eq!(reply.status, Status::Error);
    let message = reply.message.unwrap_or_default();
    assert!(message.contains("ERROR"), "message: {}", message);
}

#[tokio::test]
async fn test_validate_malformed_inline_document() {
    let dispatcher = libxml2_dispatcher();

    let reply = dispatcher
        .dispatch(
            Operation::Validate,
            &request(json!({"xml": "<books><book></books>"})),
        )
        .await;

    assert_eq!(reply.status, Status::Error);
    let message = reply.message.unwrap_or_default();
    assert!(message.contains("FATAL"), "message: {}", message);
}

const NESTED_OK: &str = "<root><test>ok</test><okok/></root>";
const NESTED_KO: &str = "<root><test>ok<okok/></root></test>";

#[tokio::test]
async fn test_validate_nested_elements() {
    let dispatcher = libxml2_dispatcher();

    let reply = dispatcher
        .dispatch(Operation::Validate, &request(json!({"xml": NESTED_OK})))
        .await;
    assert_eq!(reply.status, Status::Ok);
    assert_eq!(reply.message, None);

    let reply = dispatcher
        .dispatch(Operation::Validate, &request(json!({"xml": NESTED_KO})))
        .await;
    assert_eq!(reply.status, Status::Error);
    let message = reply.message.unwrap_or_default();
    assert!(
        message.contains("Opening and ending tag mismatch"),
        "message: {}",
        message
    );
}

#[tokio::test]
async fn test_validate_nested_elements_raw() {
    let dispatcher = libxml2_dispatcher();

    let reply = dispatcher
        .dispatch(Operation::Validate, &Request::Raw(NESTED_OK.as_bytes().to_vec()))
        .await;
    assert_eq!(reply.status, Status::Ok);
    assert_eq!(reply.message, None);

    let reply = dispatcher
        .dispatch(Operation::Validate, &Request::Raw(NESTED_KO.as_bytes().to_vec()))
        .await;
    assert_eq!(reply.status, Status::Error);
    assert!(!reply.message.unwrap_or_default().trim().is_empty());
}

#[tokio::test]
async fn test_validate_raw_payload() {
    let fixtures = TestFixtures::new();
    let dispatcher = libxml2_dispatcher();

    let raw = Request::Raw(fixtures.read("books_standalone_ok.xml").into_bytes());
    let reply = dispatcher.dispatch(Operation::Validate, &raw).await;

    assert!(reply.is_ok(), "unexpected: {:?}", reply.message);
}

#[tokio::test]
async fn test_validate_document_from_absolute_path() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file
        .write_all(
            br#"<?xml version="1.0"?>
<!DOCTYPE note [<!ELEMENT note (#PCDATA)>]>
<note><extra/></note>"#,
        )
        .unwrap();
    let path = temp_file.path().to_string_lossy().to_string();
    let dispatcher = libxml2_dispatcher();

    let reply = dispatcher
        .dispatch(Operation::Validate, &request(json!({"url_xml": path})))
        .await;

    assert_eq!(reply.status, Status::Error);
}

#[tokio::test]
async fn test_validate_missing_document_message() {
    let dispatcher = libxml2_dispatcher();

    let reply = dispatcher
        .dispatch(Operation::Validate, &request(json!({})))
        .await;

    assert_eq!(
        reply.message.as_deref(),
        Some("document source missing: xml or url_xml must be specified")
    );
}

#[tokio::test]
async fn test_transform_with_param() {
    let fixtures = TestFixtures::new();
    let dispatcher = libxml2_dispatcher();

    let reply = dispatcher
        .dispatch(
            Operation::Transform,
            &request(json!({
                "url_xml": fixtures.url("books_standalone_ok.xml"),
                "url_xsl": fixtures.url("xsl_ok.xsl"),
                "params": [{"filename": "c:/test"}]
            })),
        )
        .await;

    assert!(reply.is_ok(), "unexpected: {:?}", reply.message);
    let output = reply.output.unwrap_or_default();
    assert!(output.contains("<toto>c:/test</toto>"), "output: {}", output);
}

#[tokio::test]
async fn test_transform_inline_stylesheet_matches_remote() {
    let fixtures = TestFixtures::new();
    let dispatcher = libxml2_dispatcher();
    let params = json!([{"filename": "same"}]);

    let remote = dispatcher
        .dispatch(
            Operation::Transform,
            &request(json!({
                "url_xml": fixtures.url("books_standalone_ok.xml"),
                "url_xsl": fixtures.url("xsl_ok.xsl"),
                "params": params
            })),
        )
        .await;
    let inline = dispatcher
        .dispatch(
            Operation::Transform,
            &request(json!({
                "xml": fixtures.read("books_standalone_ok.xml"),
                "xsl": fixtures.read("xsl_ok.xsl"),
                "params": params
            })),
        )
        .await;

    assert!(remote.is_ok());
    assert_eq!(remote, inline);

    let stats = dispatcher.cache_stats().await;
    assert_eq!(stats.stylesheets.builds, 1);
    assert_eq!(stats.stylesheets.hits, 1);
}

#[tokio::test]
async fn test_transform_broken_stylesheet() {
    let fixtures = TestFixtures::new();
    let dispatcher = libxml2_dispatcher();

    let reply = dispatcher
        .dispatch(
            Operation::Transform,
            &request(json!({
                "url_xml": fixtures.url("books_standalone_ok.xml"),
                "url_xsl": fixtures.url("xsl_ko.xsl")
            })),
        )
        .await;

    assert_eq!(reply.status, Status::Error);
    let message = reply.message.unwrap_or_default();
    assert!(
        message.contains("Failed to compile stylesheet"),
        "message: {}",
        message
    );
    assert!(
        message.contains("could not compile select expression 'count(//book[)'"),
        "message: {}",
        message
    );
}

#[tokio::test]
async fn test_transform_terminating_message() {
    let dispatcher = libxml2_dispatcher();
    let stylesheet = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:template match="/">
    <xsl:message terminate="yes">stop here</xsl:message>
  </xsl:template>
</xsl:stylesheet>"#;

    let reply = dispatcher
        .dispatch(
            Operation::Transform,
            &request(json!({"xml": "<a/>", "xsl": stylesheet})),
        )
        .await;

    assert_eq!(reply.status, Status::Error);
    let message = reply.message.unwrap_or_default();
    assert!(message.starts_with("Failed to run transformation"));
    assert!(message.contains("stop here"), "message: {}", message);
}

#[tokio::test]
async fn test_transform_missing_stylesheet_file() {
    let fixtures = TestFixtures::new();
    let dispatcher = libxml2_dispatcher();

    let reply = dispatcher
        .dispatch(
            Operation::Transform,
            &request(json!({
                "url_xml": fixtures.url("books_standalone_ok.xml"),
                "url_xsl": fixtures.url("does_not_exist.xsl")
            })),
        )
        .await;

    assert_eq!(reply.status, Status::Error);
    assert!(reply.message.unwrap_or_default().starts_with("IO error"));
}

#[tokio::test]
async fn test_query_boolean_result() {
    let fixtures = TestFixtures::new();
    let dispatcher = libxml2_dispatcher();

    let reply = dispatcher
        .dispatch(
            Operation::Query,
            &request(json!({
                "url_xml": fixtures.url("books_standalone_ok.xml"),
                "query": "contains(., '352')"
            })),
        )
        .await;

    assert!(reply.is_ok(), "unexpected: {:?}", reply.message);
    assert_eq!(
        reply.output.as_deref(),
        Some(r#"<?xml version="1.0" encoding="UTF-8"?>true"#)
    );
}

#[tokio::test]
async fn test_query_with_external_variable() {
    let fixtures = TestFixtures::new();
    let dispatcher = libxml2_dispatcher();

    let reply = dispatcher
        .dispatch(
            Operation::Query,
            &request(json!({
                "xml": fixtures.read("books_standalone_ok.xml"),
                "query": "//book[@id = $id]/author",
                "params": [{"id": "solaris"}]
            })),
        )
        .await;

    assert_eq!(
        reply.output,
        Some(format!("{}<author>Stanislaw Lem</author>", XML_DECLARATION))
    );
}

#[tokio::test]
async fn test_query_syntax_error() {
    let dispatcher = libxml2_dispatcher();

    let reply = dispatcher
        .dispatch(
            Operation::Query,
            &request(json!({"xml": "<a/>", "query": "count(//a["})),
        )
        .await;

    assert_eq!(reply.status, Status::Error);
    assert!(
        reply
            .message
            .unwrap_or_default()
            .starts_with("Failed to compile query")
    );
}

#[tokio::test]
async fn test_query_rejects_flwor_expression() {
    let dispatcher = libxml2_dispatcher();

    let reply = dispatcher
        .dispatch(
            Operation::Query,
            &request(json!({"xml": "<a/>", "query": "for $x in //a return $x"})),
        )
        .await;

    assert_eq!(reply.status, Status::Error);
    assert!(
        reply
            .message
            .unwrap_or_default()
            .starts_with("Failed to compile query")
    );
}

#[tokio::test]
async fn test_xpath_results() {
    let fixtures = TestFixtures::new();
    let dispatcher = libxml2_dispatcher();
    let url = fixtures.url("books_standalone_ok.xml");
    let url = url.as_str();
    let dispatcher = &dispatcher;

    let eval = move |expression: &'static str| async move {
        let body = request(json!({"url_xml": url, "xpath": expression}));
        dispatcher.dispatch(Operation::XPath, &body).await.output
    };

    assert_eq!(eval("count(//book)").await, Some(format!("{}2", XML_DECLARATION)));
    assert_eq!(
        eval("sum(//pages)").await,
        Some(format!("{}764", XML_DECLARATION))
    );
    assert_eq!(
        eval("//book/@id").await,
        Some(format!("{}dune solaris", XML_DECLARATION))
    );
    assert_eq!(
        eval("//title").await,
        Some(format!(
            "{}<title>Dune</title><title>Solaris</title>",
            XML_DECLARATION
        ))
    );
}

#[tokio::test]
async fn test_xpath_syntax_error() {
    let dispatcher = libxml2_dispatcher();

    let reply = dispatcher
        .dispatch(
            Operation::XPath,
            &request(json!({"xml": "<a/>", "xpath": "//a[@"})),
        )
        .await;

    assert_eq!(reply.status, Status::Error);
    assert!(
        reply
            .message
            .unwrap_or_default()
            .starts_with("Failed to compile XPath expression")
    );
}
