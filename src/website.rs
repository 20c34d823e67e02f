//! Public website
//!
//! Home page plus the privacy policy and terms of service the OAuth consent
//! screen links to. Pages ship inside the binary; the Markdown documents are
//! rendered to HTML once, in [`Website::new`].

use std::sync::Arc;

use axum::{Router, extract::State, response::Html, routing::get};
use bytes::Bytes;
use pulldown_cmark::{Options, Parser, html};

const HOME: &str = include_str!("../site/home.html");
const PRIVACY_POLICY: &str = include_str!("../site/PRIVACY_POLICY.md");
const TERMS_OF_SERVICE: &str = include_str!("../site/TERMS_OF_SERVICE.md");

/// Rendered website pages
#[derive(Debug, Clone)]
pub struct Website {
    home: Bytes,
    privacy_policy: Bytes,
    terms_of_service: Bytes,
}

impl Website {
    /// Render every page
    #[must_use]
    pub fn new() -> Self {
        Self {
            home: Bytes::from_static(HOME.as_bytes()),
            privacy_policy: page("Privacy Policy", PRIVACY_POLICY).into(),
            terms_of_service: page("Terms of Service", TERMS_OF_SERVICE).into(),
        }
    }
}

impl Default for Website {
    fn default() -> Self {
        Self::new()
    }
}

/// Routes serving the website, mountable on any router
pub fn router<S>(website: Website) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(home_handler))
        .route("/privacy-policy", get(privacy_policy_handler))
        .route("/terms-of-service", get(terms_of_service_handler))
        .with_state(Arc::new(website))
}

/// Render a Markdown document to an HTML fragment
#[must_use]
pub fn render_markdown(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

fn page(title: &str, markdown: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title} - YouHedge</title>\n</head>\n<body>\n{}<p><a href=\"/\">YouHedge</a></p>\n\
         </body>\n</html>\n",
        render_markdown(markdown)
    )
}

/// GET /
async fn home_handler(State(site): State<Arc<Website>>) -> Html<Bytes> {
    Html(site.home.clone())
}

/// GET /privacy-policy
async fn privacy_policy_handler(State(site): State<Arc<Website>>) -> Html<Bytes> {
    Html(site.privacy_policy.clone())
}

/// GET /terms-of-service
async fn terms_of_service_handler(State(site): State<Arc<Website>>) -> Html<Bytes> {
    Html(site.terms_of_service.clone())
}
