#[macro_use] extern crate rocket;

mod auth;
mod calendar;
mod config;
mod cors;
mod error;
mod models;
mod notifier;
mod object_store;
mod orphans;
mod pipeline;
mod routes;
mod rsvp;
mod store;

use anyhow::Context;
use log::info;
use rocket::data::{Limits, ToByteUnit};
use rocket::fairing::AdHoc;
use rocket::fs::{FileServer, Options};
use rocket::{Build, Rocket};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use config::{AppConfig, StorageBackend};
use notifier::Notifier;
use object_store::ObjectStore;
use pipeline::UploadPipeline;
use store::{Database, MediaStore};

/// Assembles the whole site around an opened store and object store.
pub(crate) fn build_rocket(
    config: AppConfig,
    db: Arc<Database>,
    objects: Arc<dyn ObjectStore>,
) -> Rocket<Build> {
    let limits = Limits::default()
        .limit("file", config.pipeline.max_file_bytes().bytes())
        .limit("data-form", config.pipeline.max_form_bytes().bytes())
        .limit("json", 1.mebibytes());
    let figment = rocket::Config::figment().merge(("limits", limits));

    let media: Arc<dyn MediaStore> = db.clone();
    let pipeline = UploadPipeline::new(config.pipeline.clone(), objects.clone(), media);

    let scan_interval = config.orphan_scan_interval;
    let scan_grace = config.orphan_grace;
    let scan_objects = objects.clone();
    let scan_db = db.clone();
    let local_media = match &config.storage {
        StorageBackend::Local { root, public_base } if public_base.starts_with('/') => {
            Some((public_base.clone(), root.clone()))
        }
        _ => None,
    };
    let cors = cors::Cors::new(config.allowed_origins.clone());

    let mut rocket = rocket::custom(figment)
        .manage(config)
        .manage(db)
        .manage(objects)
        .manage(pipeline)
        .manage(Notifier::new())
        .attach(cors)
        .attach(AdHoc::on_liftoff("Orphan audit", move |rocket| {
            Box::pin(async move {
                let stop = CancellationToken::new();
                orphans::spawn_orphan_scan(
                    scan_objects,
                    scan_db,
                    scan_interval,
                    scan_grace,
                    stop.clone(),
                );
                let shutdown = rocket.shutdown();
                tokio::spawn(async move {
                    shutdown.await;
                    stop.cancel();
                });
            })
        }))
        .mount("/api", routes::api())
        .mount("/", routes![cors::preflight])
        .register("/", catchers![error::default_catcher]);

    if let Some((public_base, root)) = local_media {
        info!("Serving media from {} at {}", root.display(), public_base);
        rocket = rocket.mount(public_base.as_str(), FileServer::new(root, Options::Missing));
    }
    rocket
}

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env();

    if let Some(parent) = config.data_file.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let db = Database::open(config.data_file.clone())
        .await
        .with_context(|| format!("opening document store {}", config.data_file.display()))?;

    if let StorageBackend::Local { root, .. } = &config.storage {
        tokio::fs::create_dir_all(root)
            .await
            .with_context(|| format!("creating media directory {}", root.display()))?;
    }
    let objects = object_store::connect(&config.storage).await;

    let _rocket = build_rocket(config, Arc::new(db), objects).launch().await?;
    Ok(())
}
