use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use clap::Parser;

use server::config::Config;
use server::handlers;
use server::server::spawn_server;
use server::session_store::{FileSessionStore, SessionStore};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();
    let store: Arc<dyn SessionStore> = Arc::new(FileSessionStore::open(&config.data_dir).await?);
    log::info!("storing sessions in {:?}", config.data_dir);

    let (srv_tx, _) = spawn_server(store.clone(), config.server_config());
    let connection_config = config.connection_config();
    let canvas_config = config.canvas_config();

    log::info!("listening on {}", config.bind);
    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .app_data(web::Data::new(srv_tx.clone()))
            .app_data(web::Data::from(store.clone()))
            .app_data(web::Data::new(connection_config))
            .app_data(web::Data::new(canvas_config))
            .configure(handlers::root)
    })
    .bind(&config.bind)?
    .run()
    .await
}
