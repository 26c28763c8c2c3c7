//! HTTP surface: the viewer page, the MJPEG feed and an empty favicon.

use std::sync::Arc;

use actix_web::{http::header, middleware, web, App, HttpResponse, HttpServer};
use anyhow::Context;
use tracing::info;

use crate::pipeline::{AppContext, FramePipeline};
use crate::stream::{mjpeg_stream, CONTENT_TYPE};

const INDEX_HTML: &str = include_str!("../templates/index.html");

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/video_feed", web::get().to(video_feed))
        .route("/favicon.ico", web::get().to(favicon));
}

async fn index() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(INDEX_HTML)
}

async fn favicon() -> HttpResponse {
    HttpResponse::NoContent().finish()
}

/// Every request acquires the camera for itself.
async fn video_feed(context: web::Data<AppContext>) -> HttpResponse {
    let context = context.into_inner();
    let body = mjpeg_stream(move || FramePipeline::start(context));
    HttpResponse::Ok()
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .content_type(CONTENT_TYPE)
        .streaming(body)
}

pub async fn serve(context: Arc<AppContext>, host: &str, port: u16) -> anyhow::Result<()> {
    let data = web::Data::from(context);
    let server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(data.clone())
            .configure(routes)
    })
    .bind((host, port))
    .with_context(|| format!("failed to bind {host}:{port}"))?;

    info!(host, port, "serving birthday cam");
    server.run().await?;
    Ok(())
}
