use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::handler::Handler;
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use workshop_contracts::{Listing, MessageBody, PageWindow, Role};
use workshop_store::{
    Client, Jewelry, Order, Record, RecordInput, RecordStore, Repair, Smartwatch,
};

use super::{ApiError, AppState, Stores, json_error, require_role, store_error};
use crate::config::GatewayConfig;

const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// A record type served under `/api/<collection>`.
pub(super) trait Collection: Record {
    fn store(stores: &Stores) -> &Arc<dyn RecordStore<Self>>;
}

impl Collection for Client {
    fn store(stores: &Stores) -> &Arc<dyn RecordStore<Self>> {
        &stores.clients
    }
}

impl Collection for Repair {
    fn store(stores: &Stores) -> &Arc<dyn RecordStore<Self>> {
        &stores.repairs
    }
}

impl Collection for Smartwatch {
    fn store(stores: &Stores) -> &Arc<dyn RecordStore<Self>> {
        &stores.smartwatches
    }
}

impl Collection for Jewelry {
    fn store(stores: &Stores) -> &Arc<dyn RecordStore<Self>> {
        &stores.jewelry
    }
}

impl Collection for Order {
    fn store(stores: &Stores) -> &Arc<dyn RecordStore<Self>> {
        &stores.orders
    }
}

pub(super) fn collection_routes<R: Collection>(config: &GatewayConfig) -> Router<AppState> {
    let base = format!("/api/{}", R::COLLECTION);
    let item = format!("{}/{{id}}", base);
    let media = format!("{}/media", item);

    Router::new()
        .route(&base, get(list::<R>).post(create::<R>))
        .route(
            &item,
            get(view::<R>).put(update::<R>).delete(
                remove::<R>.layer(middleware::from_fn_with_state(Role::Admin, require_role)),
            ),
        )
        .route(
            &media,
            post(upload_media::<R>).layer(DefaultBodyLimit::max(
                config.media_max_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES),
            )),
        )
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    #[serde(default)]
    page: Option<String>,
}

async fn list<R: Collection>(
    State(state): State<AppState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<Listing<R>>, ApiError> {
    // An undecodable query string (a repeated `page`, say) lists the first page.
    let page = match &query {
        Ok(Query(query)) => query.page.as_deref(),
        Err(rejection) => {
            tracing::debug!(error = %rejection, "listing.query ignored");
            None
        }
    };
    let window = PageWindow::from_query(page, state.config.page_size);

    let listing = R::store(&state.stores)
        .page(window)
        .await
        .map_err(store_error)?;

    crate::metrics::observe_listing_page(R::COLLECTION);
    tracing::debug!(
        collection = R::COLLECTION,
        page = listing.current_page,
        total_items = listing.total_items,
        "listing.page"
    );
    Ok(Json(listing))
}

async fn view<R: Collection>(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<R>, ApiError> {
    let id = parse_id::<R>(&raw_id)?;

    R::store(&state.stores)
        .get(id)
        .await
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(not_found::<R>)
}

async fn create<R: Collection>(
    State(state): State<AppState>,
    req: Result<Json<R::Input>, JsonRejection>,
) -> Result<(StatusCode, Json<R>), ApiError> {
    let input = parse_input::<R>(req)?;

    let created = R::store(&state.stores)
        .create(input)
        .await
        .map_err(store_error)?;

    tracing::info!(collection = R::COLLECTION, id = created.id(), "record.created");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update<R: Collection>(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    req: Result<Json<R::Input>, JsonRejection>,
) -> Result<Json<R>, ApiError> {
    let id = parse_id::<R>(&raw_id)?;
    let input = parse_input::<R>(req)?;

    let updated = R::store(&state.stores)
        .update(id, input)
        .await
        .map_err(store_error)?
        .ok_or_else(not_found::<R>)?;

    tracing::info!(collection = R::COLLECTION, id, "record.updated");
    Ok(Json(updated))
}

async fn remove<R: Collection>(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<MessageBody>, ApiError> {
    let id = parse_id::<R>(&raw_id)?;

    let deleted = R::store(&state.stores)
        .delete(id)
        .await
        .map_err(store_error)?;
    if !deleted {
        return Err(not_found::<R>());
    }

    tracing::info!(collection = R::COLLECTION, id, "record.deleted");
    Ok(Json(MessageBody {
        message: format!("{} deleted", R::LABEL),
    }))
}

async fn upload_media<R: Collection>(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<R>, ApiError> {
    let id = parse_id::<R>(&raw_id)?;
    let store = R::store(&state.stores);

    if store.get(id).await.map_err(store_error)?.is_none() {
        return Err(not_found::<R>());
    }

    let mut multipart = multipart.map_err(|rejection| {
        json_error(
            StatusCode::BAD_REQUEST,
            "ERR_INVALID_PARAMS",
            rejection.body_text(),
        )
    })?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(|err| {
        json_error(err.status(), "ERR_INVALID_PARAMS", err.body_text())
    })? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.map_err(|err| {
            json_error(err.status(), "ERR_INVALID_PARAMS", err.body_text())
        })?;
        upload = Some((file_name, bytes));
        break;
    }

    let Some((file_name, bytes)) = upload else {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "ERR_INVALID_PARAMS",
            "missing multipart field: file",
        ));
    };

    let public_path = state
        .media
        .save(R::COLLECTION, file_name.as_deref(), &bytes)
        .await
        .map_err(|err| {
            let status = match err.code {
                "ERR_PAYLOAD_TOO_LARGE" => StatusCode::PAYLOAD_TOO_LARGE,
                "ERR_INVALID_PARAMS" => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            json_error(status, err.code, err.message)
        })?;

    let updated = store
        .set_media(id, &public_path)
        .await
        .map_err(store_error)?
        .ok_or_else(not_found::<R>)?;

    tracing::info!(
        collection = R::COLLECTION,
        id,
        field = R::MEDIA_FIELD,
        size_bytes = bytes.len(),
        "record.media_saved"
    );
    Ok(Json(updated))
}

// Ids that are not integers cannot name a row.
fn parse_id<R: Collection>(raw: &str) -> Result<i64, ApiError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(not_found::<R>)
}

fn parse_input<R: Collection>(
    req: Result<Json<R::Input>, JsonRejection>,
) -> Result<R::Input, ApiError> {
    let Json(input) = req.map_err(|rejection| {
        json_error(
            StatusCode::BAD_REQUEST,
            "ERR_INVALID_PARAMS",
            rejection.body_text(),
        )
    })?;

    input
        .normalized()
        .map_err(|message| json_error(StatusCode::BAD_REQUEST, "ERR_VALIDATION", message))
}

fn not_found<R: Collection>() -> ApiError {
    json_error(
        StatusCode::NOT_FOUND,
        "ERR_NOT_FOUND",
        format!("{} not found", R::LABEL),
    )
}
