//! End-to-end protocol tests against the full router.

use std::sync::Arc;

use salvo::Service;
use salvo::http::{Method, ReqBody};
use salvo::test::{RequestBuilder, ResponseExt as _, TestClient};

use cairn_app::app::api::routes;
use cairn_app::state::ServerState;
use cairn_repo::{MemoryActivityStore, MemoryRepository, Repository as _, Transaction as _};

const BASE: &str = "http://127.0.0.1:5800/repos";

fn service() -> (Service, Arc<MemoryRepository>) {
    let repo = Arc::new(MemoryRepository::new());
    let name = repo.begin_txn(0, Some("alice")).unwrap();
    let mut txn = repo.open_txn(&name).unwrap();
    txn.make_dir("trunk").unwrap();
    txn.put_file("trunk/a.txt", b"alpha\n".to_vec()).unwrap();
    txn.set_rev_prop("svn:log", b"add trunk".to_vec()).unwrap();
    txn.commit(&[]).unwrap();

    let state = ServerState::new(
        repo.clone(),
        Arc::new(MemoryActivityStore::new()),
        "/repos",
    );
    (Service::new(salvo::Router::new().push(routes(state))), repo)
}

fn request(method: &str, url: &str, body: &str) -> RequestBuilder {
    let builder = RequestBuilder::new(url, Method::from_bytes(method.as_bytes()).unwrap());
    if body.is_empty() {
        builder
    } else {
        builder.body(ReqBody::Once(body.as_bytes().to_vec().into()))
    }
}

#[tokio::test]
async fn options_advertises_version_control() {
    let (service, _repo) = service();
    let response = TestClient::options(format!("{BASE}/trunk"))
        .send(&service)
        .await;
    assert_eq!(response.status_code.unwrap().as_u16(), 200);
    let dav = response.headers().get("DAV").unwrap().to_str().unwrap();
    assert!(dav.contains("version-control"));
}

#[tokio::test]
async fn options_returns_activity_collection() {
    let (service, _repo) = service();
    let body = r#"<D:options xmlns:D="DAV:"><D:activity-collection-set/></D:options>"#;
    let mut response = request("OPTIONS", &format!("{BASE}/trunk"), body)
        .send(&service)
        .await;
    let text = response.take_string().await.unwrap();
    assert!(text.contains("/repos/!svn/act/"));
}

#[tokio::test]
async fn full_commit_saga_over_http() {
    let (service, repo) = service();

    // 1. MKACTIVITY
    let response = request("MKACTIVITY", &format!("{BASE}/!svn/act/saga-1"), "")
        .send(&service)
        .await;
    assert_eq!(response.status_code.unwrap().as_u16(), 201);

    // Duplicate id conflicts.
    let response = request("MKACTIVITY", &format!("{BASE}/!svn/act/saga-1"), "")
        .send(&service)
        .await;
    assert_eq!(response.status_code.unwrap().as_u16(), 409);

    // 2. CHECKOUT the version resource into the activity.
    let checkout_body = r#"<D:checkout xmlns:D="DAV:">
  <D:activity-set><D:href>/repos/!svn/act/saga-1</D:href></D:activity-set>
</D:checkout>"#;
    let response = request(
        "CHECKOUT",
        &format!("{BASE}/!svn/ver/1/trunk/a.txt"),
        checkout_body,
    )
    .send(&service)
    .await;
    assert_eq!(response.status_code.unwrap().as_u16(), 201);
    let location = response
        .headers()
        .get("Location")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(location, "/repos/!svn/wrk/saga-1/trunk/a.txt");

    // 3. PUT new content against the working resource.
    let response = request("PUT", &format!("http://127.0.0.1:5800{location}"), "alpha v2\n")
        .send(&service)
        .await;
    assert_eq!(response.status_code.unwrap().as_u16(), 204);

    // 3b. PROPPATCH stages a property alongside.
    let proppatch_body = r#"<D:propertyupdate xmlns:D="DAV:"
    xmlns:S="http://subversion.tigris.org/xmlns/svn/">
  <D:set><D:prop><S:mime-type>text/x-alpha</S:mime-type></D:prop></D:set>
</D:propertyupdate>"#;
    let response = request(
        "PROPPATCH",
        &format!("http://127.0.0.1:5800{location}"),
        proppatch_body,
    )
    .send(&service)
    .await;
    assert_eq!(response.status_code.unwrap().as_u16(), 207);

    // Nothing finalized yet.
    assert_eq!(repo.latest_revision().unwrap(), 1);

    // 4. MERGE commits the activity.
    let merge_body = r#"<D:merge xmlns:D="DAV:">
  <D:source><D:href>/repos/!svn/act/saga-1</D:href></D:source>
  <D:no-auto-merge/><D:no-checkout/>
</D:merge>"#;
    let mut response = request("MERGE", &format!("{BASE}/trunk"), merge_body)
        .send(&service)
        .await;
    assert_eq!(response.status_code.unwrap().as_u16(), 200);
    let text = response.take_string().await.unwrap();
    assert!(text.contains("D:merge-response"));
    assert!(text.contains("<D:version-name>2</D:version-name>"));

    assert_eq!(repo.latest_revision().unwrap(), 2);
    assert_eq!(repo.file_content("trunk/a.txt", None).unwrap(), b"alpha v2\n");

    // The activity is one-shot: a second merge of it conflicts.
    let response = request("MERGE", &format!("{BASE}/trunk"), merge_body)
        .send(&service)
        .await;
    assert_eq!(response.status_code.unwrap().as_u16(), 409);
}

#[tokio::test]
async fn merge_with_non_activity_source_is_405() {
    let (service, _repo) = service();
    let merge_body = r#"<D:merge xmlns:D="DAV:">
  <D:source><D:href>/repos/trunk</D:href></D:source>
</D:merge>"#;
    let response = request("MERGE", &format!("{BASE}/trunk"), merge_body)
        .send(&service)
        .await;
    assert_eq!(response.status_code.unwrap().as_u16(), 405);
}

#[tokio::test]
async fn checkout_of_already_working_resource_conflicts() {
    let (service, _repo) = service();
    let response = request("MKACTIVITY", &format!("{BASE}/!svn/act/w1"), "")
        .send(&service)
        .await;
    assert_eq!(response.status_code.unwrap().as_u16(), 201);

    let body = r#"<D:checkout xmlns:D="DAV:">
  <D:activity-set><D:href>/repos/!svn/act/w1</D:href></D:activity-set>
</D:checkout>"#;
    let response = request("CHECKOUT", &format!("{BASE}/!svn/wrk/w1/trunk/a.txt"), body)
        .send(&service)
        .await;
    assert_eq!(response.status_code.unwrap().as_u16(), 409);
}

#[tokio::test]
async fn propfind_mixes_found_and_missing_properties() {
    let (service, _repo) = service();
    let body = r#"<D:propfind xmlns:D="DAV:">
  <D:prop><D:version-name/><D:getcontentlength/></D:prop>
</D:propfind>"#;
    let mut response = request("PROPFIND", &format!("{BASE}/trunk"), body)
        .add_header("Depth", "0", true)
        .send(&service)
        .await;
    assert_eq!(response.status_code.unwrap().as_u16(), 207);
    let text = response.take_string().await.unwrap();
    assert!(text.contains("HTTP/1.1 200 OK"));
    assert!(text.contains("HTTP/1.1 404 Not Found"));
    assert!(text.contains("<D:version-name>1</D:version-name>"));
}

#[tokio::test]
async fn log_report_streams_items_in_requested_order() {
    let (service, repo) = service();
    let name = repo.begin_txn(1, Some("alice")).unwrap();
    let mut txn = repo.open_txn(&name).unwrap();
    txn.put_file("trunk/b.txt", b"beta\n".to_vec()).unwrap();
    txn.set_rev_prop("svn:log", b"add b".to_vec()).unwrap();
    txn.commit(&[]).unwrap();

    let ascending = r#"<S:log-report xmlns:S="svn:">
  <S:start-revision>1</S:start-revision>
  <S:end-revision>2</S:end-revision>
</S:log-report>"#;
    let mut response = request("REPORT", &format!("{BASE}/trunk"), ascending)
        .send(&service)
        .await;
    let text = response.take_string().await.unwrap();
    let first = text.find("<D:version-name>1<").unwrap();
    let second = text.find("<D:version-name>2<").unwrap();
    assert!(first < second);

    let descending = r#"<S:log-report xmlns:S="svn:">
  <S:start-revision>2</S:start-revision>
  <S:end-revision>1</S:end-revision>
</S:log-report>"#;
    let mut response = request("REPORT", &format!("{BASE}/trunk"), descending)
        .send(&service)
        .await;
    let text = response.take_string().await.unwrap();
    let first = text.find("<D:version-name>2<").unwrap();
    let second = text.find("<D:version-name>1<").unwrap();
    assert!(first < second);
}

#[tokio::test]
async fn get_locks_report_base64_frames_nul_comments() {
    let (service, repo) = service();
    repo.lock("trunk/a.txt", "alice", Some(b"nul\x00comment"), false)
        .unwrap();

    let body = r#"<S:get-locks-report xmlns:S="svn:"/>"#;
    let mut response = request("REPORT", &format!("{BASE}/trunk"), body)
        .send(&service)
        .await;
    assert_eq!(response.status_code.unwrap().as_u16(), 200);
    let text = response.take_string().await.unwrap();
    assert!(text.contains("<S:comment encoding=\"base64\">"));

    use base64::Engine as _;
    let start = text.find("<S:comment encoding=\"base64\">").unwrap()
        + "<S:comment encoding=\"base64\">".len();
    let end = text[start..].find("</S:comment>").unwrap() + start;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(text[start..end].trim())
        .unwrap();
    assert_eq!(decoded, b"nul\x00comment");
}

#[tokio::test]
async fn dated_rev_report_resolves_a_timestamp() {
    let (service, _repo) = service();
    let future = chrono::Utc::now() + chrono::Duration::hours(1);
    let body = format!(
        r#"<S:dated-rev-report xmlns:S="svn:" xmlns:D="DAV:">
  <D:creationdate>{}</D:creationdate>
</S:dated-rev-report>"#,
        future.to_rfc3339()
    );
    let mut response = request("REPORT", &format!("{BASE}/"), &body)
        .send(&service)
        .await;
    let text = response.take_string().await.unwrap();
    assert!(text.contains("<D:version-name>1</D:version-name>"));
}

#[tokio::test]
async fn malformed_report_is_rejected_before_repository_work() {
    let (service, _repo) = service();
    let body = r#"<S:log-report xmlns:S="svn:"><S:start-revision>banana</S:start-revision></S:log-report>"#;
    let mut response = request("REPORT", &format!("{BASE}/trunk"), body)
        .send(&service)
        .await;
    assert_eq!(response.status_code.unwrap().as_u16(), 400);
    let text = response.take_string().await.unwrap();
    assert!(text.contains("start-revision"));
}

#[tokio::test]
async fn lock_and_unlock_round_trip() {
    let (service, _repo) = service();

    let response = request("LOCK", &format!("{BASE}/trunk/a.txt"), "")
        .send(&service)
        .await;
    assert_eq!(response.status_code.unwrap().as_u16(), 200);
    let token = response
        .headers()
        .get("Lock-Token")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    // A second LOCK without steal conflicts.
    let response = request("LOCK", &format!("{BASE}/trunk/a.txt"), "")
        .send(&service)
        .await;
    assert_eq!(response.status_code.unwrap().as_u16(), 409);

    let response = request("UNLOCK", &format!("{BASE}/trunk/a.txt"), "")
        .add_header("Lock-Token", token.as_str(), true)
        .send(&service)
        .await;
    assert_eq!(response.status_code.unwrap().as_u16(), 204);
}

#[tokio::test]
async fn get_serves_file_content() {
    let (service, _repo) = service();
    let mut response = TestClient::get(format!("{BASE}/trunk/a.txt"))
        .send(&service)
        .await;
    assert_eq!(response.status_code.unwrap().as_u16(), 200);
    assert_eq!(response.take_string().await.unwrap(), "alpha\n");

    let response = TestClient::get(format!("{BASE}/trunk/missing.txt"))
        .send(&service)
        .await;
    assert_eq!(response.status_code.unwrap().as_u16(), 404);
}
