use crate::connection::ws_index;
use crate::handlers::sessions::configure_session_handlers;
use actix_web::web;

mod sessions;

pub fn root(cfg: &mut web::ServiceConfig) {
    configure_session_handlers(cfg);

    // any other single-segment path names a session to connect to
    cfg.service(web::resource("/{session_id}").route(web::get().to(ws_index)));
}
