mod articles;
mod auth;
mod comments;
mod config;
mod db;
mod error;
mod ledger;
mod likes;
mod moderation;
mod pagination;
mod tags;
mod users;

#[cfg(test)]
mod testing;

use axum::{
    http::HeaderValue,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

pub type DbPool = r2d2::Pool<r2d2_sqlite::SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub jwt_secret: String,
    pub articles_per_page: i64,
    pub comments_per_page: i64,
    pub paginate_orphans: i64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        // Auth & users
        .route("/auth/me", get(auth::me))
        .route("/user/{id}/", delete(users::delete_user))
        // Articles
        .route(
            "/articles/",
            get(articles::list_articles).post(articles::create_article),
        )
        .route(
            "/article/{id}/",
            get(articles::get_article)
                .put(articles::update_article)
                .delete(articles::delete_article),
        )
        .route("/article/{id}/comments/", post(comments::create_comment))
        // Comments
        .route(
            "/comment/{id}/",
            put(comments::update_comment).delete(comments::delete_comment),
        )
        // Likes
        .route("/article/{id}/like/", get(likes::like_article))
        .route("/article/{id}/unlike/", get(likes::unlike_article))
        .route("/comment/{id}/like/", get(likes::like_comment))
        .route("/comment/{id}/unlike/", get(likes::unlike_comment))
        // Tags
        .route("/tags/", get(tags::list_tags))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env().expect("Invalid configuration");

    let pool = db::open_pool(&config.database_url).expect("Failed to create DB pool");
    db::run_migrations(&pool).expect("Failed to run migrations");

    let repaired = pool
        .get()
        .map_err(error::AppError::from)
        .and_then(|mut conn| ledger::reconcile_all(&mut conn).map_err(error::AppError::from));
    match repaired {
        Ok(0) => tracing::debug!("like counters consistent"),
        Ok(n) => tracing::warn!(repaired = n, "like counters repaired at startup"),
        Err(e) => tracing::error!(error = %e, "like counter check failed"),
    }

    if let Some(user_id) = config.dev_token_user {
        match auth::issue_token(user_id, &config.jwt_secret) {
            Ok(token) => tracing::warn!(user_id, %token, "development token issued"),
            Err(e) => tracing::error!(error = %e, "could not issue development token"),
        }
    }

    let state = AppState {
        db: pool,
        jwt_secret: config.jwt_secret.clone(),
        articles_per_page: config.articles_per_page,
        comments_per_page: config.comments_per_page,
        paginate_orphans: config.paginate_orphans,
    };

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .cors_origin
                .parse::<HeaderValue>()
                .expect("Invalid CORS_ORIGIN"),
        )
        .allow_methods(AllowMethods::any())
        .allow_headers(AllowHeaders::any());

    let app = router(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("Failed to bind listen address");
    tracing::info!(addr = %config.listen_addr, "API server listening");
    axum::serve(listener, app).await.expect("Server error");
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::testing;

    #[tokio::test]
    async fn health_and_unknown_routes() {
        let (_dir, pool) = testing::temp_pool();
        let app = crate::router(testing::state(pool));

        let req = axum::http::Request::builder()
            .uri("/health")
            .body(axum::body::Body::empty())
            .unwrap();
        let resp = tower::ServiceExt::oneshot(app.clone(), req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let (status, _) = testing::send(&app, "GET", "/nope/", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn tag_listing_counts_articles() {
        let (_dir, pool) = testing::temp_pool();
        let alice = testing::create_user(&pool, "alice", false);
        let app = crate::router(testing::state(pool));
        let t = testing::token(alice);

        for title in ["First long title", "Second long title"] {
            let (status, _) = testing::send(
                &app,
                "POST",
                "/articles/",
                Some(&t),
                Some(serde_json::json!({ "title": title, "text": "body", "tags": ["rust"] })),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, body) = testing::send(&app, "GET", "/tags/", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let tags = body.as_array().unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0]["name"], "alice");
        assert_eq!(tags[0]["article_count"], 2);
        assert_eq!(tags[1]["name"], "rust");
    }
}
