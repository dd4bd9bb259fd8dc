//! Response envelopes: `{data}` for one value, `{data, meta: {count, total?}}` for lists.

use axum::{http::StatusCode, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct Single<T> {
    pub data: T,
}

#[derive(Serialize)]
pub struct Listing<T> {
    pub data: Vec<T>,
    pub meta: ListMeta,
}

#[derive(Serialize)]
pub struct ListMeta {
    /// Rows in this page.
    pub count: usize,
    /// Matches ignoring skip/take, when asked for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

pub type SingleResponse<T> = (StatusCode, Json<Single<T>>);
pub type ListResponse<T> = (StatusCode, Json<Listing<T>>);

pub fn created<T: Serialize>(data: T) -> SingleResponse<T> {
    (StatusCode::CREATED, Json(Single { data }))
}

pub fn ok<T: Serialize>(data: T) -> SingleResponse<T> {
    (StatusCode::OK, Json(Single { data }))
}

/// `total` is the `COUNT(*)` of the unpaginated query.
pub fn listed<T: Serialize>(data: Vec<T>, total: Option<i64>) -> ListResponse<T> {
    let meta = ListMeta {
        count: data.len(),
        total: total.map(|t| u64::try_from(t).unwrap_or_default()),
    };
    (StatusCode::OK, Json(Listing { data, meta }))
}
