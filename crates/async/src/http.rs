// plcconnector-rs
//
// a CIP/EtherNet/IP tag server, with rust style APIs and useful extensions.
// Copyright: 2022, Joylei <leingliu@gmail.com>
// License: MIT

//! read-only status page

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json},
    routing::get,
    Router,
};
use plcconnector_core::{TagData, TagRegistry, Value};
use serde::Serialize;
use std::{fmt::Write, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Serialize)]
struct TagView {
    name: String,
    #[serde(rename = "type")]
    elem_type: &'static str,
    count: usize,
    values: Vec<Value>,
}

impl From<TagData> for TagView {
    fn from(tag: TagData) -> Self {
        Self {
            values: tag.values(),
            name: tag.name,
            elem_type: tag.elem_type.name(),
            count: tag.count,
        }
    }
}

/// Routes:
/// - GET / -> html table of all tags
/// - GET /api/tags -> json array of all tags
/// - GET /api/tags/:name -> json of one tag, 404 if unknown
fn router(registry: Arc<TagRegistry>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/tags", get(list_tags))
        .route("/api/tags/:name", get(get_tag))
        .with_state(registry)
}

pub(crate) async fn serve(listener: TcpListener, registry: Arc<TagRegistry>, token: CancellationToken) {
    let app = router(registry);
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        token.cancelled().await;
    });
    if let Err(e) = server.await {
        error!("http: {}", e);
    }
}

async fn list_tags(State(registry): State<Arc<TagRegistry>>) -> impl IntoResponse {
    let tags: Vec<TagView> = registry.snapshot().into_iter().map(TagView::from).collect();
    Json(tags)
}

async fn get_tag(
    State(registry): State<Arc<TagRegistry>>,
    Path(name): Path<String>,
) -> Result<Json<TagView>, (StatusCode, String)> {
    let not_found = |e: plcconnector_core::Error| (StatusCode::NOT_FOUND, e.to_string());
    let info = registry.info(&name).map_err(not_found)?;
    let tag = registry.read_tag(&name, 0, info.count).map_err(not_found)?;
    Ok(Json(tag.into()))
}

async fn index(State(registry): State<Arc<TagRegistry>>) -> Html<String> {
    let mut page = String::from(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>plcconnector</title></head><body>\n\
         <table border=\"1\"><tr><th>name</th><th>type</th><th>count</th><th>values</th></tr>\n",
    );
    for tag in registry.snapshot() {
        let values: Vec<String> = tag.values().iter().map(|v| v.to_string()).collect();
        let _ = writeln!(
            page,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(&tag.name),
            tag.elem_type,
            tag.count,
            values.join(", ")
        );
    }
    page.push_str("</table></body></html>\n");
    Html(page)
}

fn escape(text: &str) -> String {
    let mut s = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => s.push_str("&lt;"),
            '>' => s.push_str("&gt;"),
            '&' => s.push_str("&amp;"),
            '"' => s.push_str("&quot;"),
            '\'' => s.push_str("&#39;"),
            _ => s.push(c),
        }
    }
    s
}
