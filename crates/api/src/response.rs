use serde::Serialize;

/// `{ "data": T }` envelope used by every JSON endpoint.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
