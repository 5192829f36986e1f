//! Server-rendered pages

use axum::{
    Router,
    response::{Html, IntoResponse},
    routing::get,
};

use crate::AppState;

/// Create the pages router
///
/// Routes:
/// - GET / - Home page
pub fn pages_router() -> Router<AppState> {
    Router::new().route("/", get(home_page))
}

/// GET /
///
/// Renders the home page with links into the auth flows.
async fn home_page() -> impl IntoResponse {
    Html(
        r#"
        <!DOCTYPE html>
        <html>
        <head><title>Portico</title></head>
        <body>
            <h1>Portico</h1>
            <p>Sample integration with a hosted authentication provider</p>
            <ul>
                <li><a href="/auth/login">Sign in</a></li>
                <li><a href="/auth/signup">Sign up</a></li>
                <li><a href="/auth/logout">Sign out</a></li>
            </ul>
        </body>
        </html>
    "#,
    )
}
