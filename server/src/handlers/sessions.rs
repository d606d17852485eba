use actix_web::{error, web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use system::serde_json::json;
use system::{Background, Color, SessionId};

use crate::config::CanvasConfig;
use crate::server::{ServerCommand, ServerTx};
use crate::session_store::{SessionRecord, SessionStore, StoreError};

pub fn configure_session_handlers(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/sessions")
            .route(web::get().to(list_sessions))
            .route(web::post().to(create_session)),
    )
    .service(
        web::resource("/sessions/{session_id}")
            .route(web::get().to(show_session))
            .route(web::put().to(modify_session)),
    );
}

#[derive(Serialize)]
struct SessionSummary<'a> {
    #[serde(rename = "_id")]
    id: &'a str,
    users: &'a [String],
}

fn internal_error(err: StoreError) -> actix_web::Error {
    log::error!("session store failure: {}", err);
    error::ErrorInternalServerError("Server Error")
}

fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(json!({ "error": message }))
}

fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(json!({ "error": "Session not found" }))
}

async fn list_sessions(store: web::Data<dyn SessionStore>) -> actix_web::Result<impl Responder> {
    let sessions = store.list().await.map_err(internal_error)?;
    let summaries: Vec<_> = sessions
        .iter()
        .map(|(id, record)| SessionSummary {
            id,
            users: &record.users,
        })
        .collect();
    Ok(HttpResponse::Ok().json(summaries))
}

/// Rows of `#rrggbb` strings.
fn image_rows(image: &Background) -> Vec<Vec<String>> {
    image
        .pixels
        .chunks(image.width.max(1))
        .map(|row| row.iter().map(Color::to_string).collect())
        .collect()
}

async fn show_session(
    path: web::Path<SessionId>,
    store: web::Data<dyn SessionStore>,
) -> actix_web::Result<HttpResponse> {
    let session_id = path.into_inner();
    let record = match store.load(&session_id).await.map_err(internal_error)? {
        Some(record) => record,
        None => return Ok(not_found()),
    };
    Ok(HttpResponse::Ok().json(json!({
        "_id": session_id,
        "users": record.users,
        "image": image_rows(&record.image),
    })))
}

#[derive(Deserialize)]
pub struct CreateSessionBody {
    #[serde(rename = "userName")]
    user_name: Option<String>,
}

async fn create_session(
    body: web::Json<CreateSessionBody>,
    store: web::Data<dyn SessionStore>,
    canvas: web::Data<CanvasConfig>,
) -> actix_web::Result<HttpResponse> {
    let user_name = match body.into_inner().user_name {
        Some(name) if !name.trim().is_empty() => name,
        _ => return Ok(bad_request("User name is required")),
    };
    let record = SessionRecord::new(user_name, Background::blank(canvas.width, canvas.height));
    let users = record.users.clone();
    let session_id = store.create(record).await.map_err(internal_error)?;
    log::info!("created session {}", session_id);

    Ok(HttpResponse::Ok().json(json!({
        "message": "Session created",
        "session": SessionSummary { id: &session_id, users: &users },
        "userIndex": 0,
    })))
}

#[derive(Deserialize)]
pub struct ModifySessionBody {
    #[serde(rename = "userName")]
    user_name: Option<String>,
    r: Option<usize>,
    c: Option<usize>,
    color: Option<String>,
}

async fn modify_session(
    path: web::Path<SessionId>,
    body: web::Json<ModifySessionBody>,
    store: web::Data<dyn SessionStore>,
    srv_tx: web::Data<ServerTx>,
) -> actix_web::Result<HttpResponse> {
    let session_id = path.into_inner();
    let body = body.into_inner();

    let existing = match store.load(&session_id).await.map_err(internal_error)? {
        Some(record) => record,
        None => return Ok(not_found()),
    };

    let paint = match (body.r, body.c, body.color.as_deref()) {
        (Some(r), Some(c), Some(color)) => {
            let color: Color = match color.parse() {
                Ok(color) => color,
                Err(err) => return Ok(bad_request(&err.to_string())),
            };
            if existing.image.get(r, c).is_none() {
                return Ok(bad_request("Pixel out of range"));
            }
            Some((r, c, color))
        }
        _ => None,
    };
    let user_name = body.user_name.filter(|name| !name.trim().is_empty());

    let name = user_name.clone();
    let record = store
        .update(
            &session_id,
            Box::new(move |record| {
                if let Some(name) = name {
                    record.users.push(name);
                }
                if let Some((r, c, color)) = paint {
                    record.image.paint(r, c, color);
                }
            }),
        )
        .await;
    let record = match record {
        Ok(record) => record,
        Err(StoreError::NotFound(_)) => return Ok(not_found()),
        Err(err) => return Err(internal_error(err)),
    };

    let user_index = match user_name {
        Some(name) => {
            // appended under the store lock, so the new participant is last
            let user_index = record.users.len() - 1;
            log::info!("{} joined session {} as user {}", name, session_id, user_index);
            let _ = srv_tx.send(ServerCommand::ParticipantJoined {
                session_id: session_id.clone(),
                user_index,
                name,
            });
            Some(user_index)
        }
        None => None,
    };

    Ok(HttpResponse::Ok().json(json!({
        "message": "Session modified",
        "session": SessionSummary { id: &session_id, users: &record.users },
        "userIndex": user_index,
    })))
}
