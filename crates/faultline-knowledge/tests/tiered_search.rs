//! End-to-end tier selection through `KnowledgeBase::build_index`.

use std::sync::Arc;
use std::time::Duration;

use faultline_knowledge::{IncidentCase, IndexPlan, KnowledgeBase, MilvusConfig, MilvusStore};
use faultline_llm::MockEmbedder;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn knowledge() -> KnowledgeBase {
    KnowledgeBase::new(vec![
        IncidentCase::new(
            "MySQL connection refused",
            "connection refused on port 3306",
            "mysqld not running",
            "restart mysql service",
        )
        .with_severity("high"),
        IncidentCase::new("Nginx 502", "upstream prematurely closed", "php-fpm crash", "restart php-fpm"),
    ])
}

#[tokio::test]
async fn remote_answer_wins() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/vectordb/collections/has"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 0, "data": {"has": true}})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/vectordb/entities/upsert"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 0, "data": {}})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/vectordb/entities/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": [{"id": "case-1", "distance": 1.0, "content": "remote doc",
                      "error_type": "Nginx 502", "log_content": "", "root_cause": "php-fpm crash",
                      "solution": "restart php-fpm"}]
        })))
        .mount(&server)
        .await;

    let remote = Arc::new(MilvusStore::new(MilvusConfig::new(server.uri(), "aiops_knowledge_v1")).unwrap());
    let plan = IndexPlan {
        remote: Some(remote),
        sync_remote: true,
        local: true,
        dims: 8,
    };
    let index = knowledge().build_index(Some(Arc::new(MockEmbedder::new(8))), plan).await;
    assert_eq!(index.tier_names(), vec!["milvus", "local", "lexical"]);

    let results = index.search("mysql connection refused", 3).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].case.error_type, "Nginx 502");
    assert_eq!(results[0].similarity, 0.5);
    assert_eq!(results[0].content.as_deref(), Some("remote doc"));
}

#[tokio::test]
async fn unreachable_remote_falls_back_to_local() {
    let remote = Arc::new(
        MilvusStore::new(
            MilvusConfig::new("http://127.0.0.1:9", "aiops_knowledge_v1")
                .with_timeout(Duration::from_millis(200)),
        )
        .unwrap(),
    );
    let plan = IndexPlan {
        remote: Some(remote),
        sync_remote: true,
        local: true,
        dims: 8,
    };
    let kb = knowledge();
    let index = kb.build_index(Some(Arc::new(MockEmbedder::new(8))), plan).await;

    let query = kb.cases()[0].document_text();
    let results = index.search(&query, 3).await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].case.error_type, "MySQL connection refused");
    assert_eq!(results[0].similarity, 1.0);
}

#[tokio::test]
async fn everything_down_still_answers_lexically() {
    let plan = IndexPlan {
        remote: None,
        sync_remote: false,
        local: true,
        dims: 8,
    };
    let index = knowledge()
        .build_index(Some(Arc::new(MockEmbedder::failing(8))), plan)
        .await;

    let results = index.search("mysql connection refused", 3).await;
    assert_eq!(results.len(), 1);
    assert!(results[0].similarity > 0.0);

    let empty = KnowledgeBase::default()
        .build_index(None, IndexPlan::default())
        .await;
    assert!(empty.search("mysql connection refused", 3).await.is_empty());
}
