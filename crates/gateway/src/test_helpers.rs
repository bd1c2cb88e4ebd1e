//! # テスト用共通ヘルパー
//!
//! Drive / Secret Manager / トークンエンドポイントの代わりに立てるモックサーバー。

/// ルーターを127.0.0.1の空きポートで起動し、ベースURLを返す。
pub async fn spawn_mock_server(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    format!("http://127.0.0.1:{port}")
}
