// core/api.rs

// Request/response surface of the control panel. Every operation a dashboard or CLI
// can perform goes through `Api::handle`, which maps domain errors onto HTTP-like
// status codes so clients can keep their existing error handling.

use log::{debug, error};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, MutexGuard};

use super::status::SharedStatus;
use super::tags::{TagError, TagRegistry};
use crate::navigation::{RouteController, RouteError, RouteRequest};

/// Operation requested by a client
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ApiRequest {
    /// Plan and dispatch a route
    Route {
        #[serde(default)]
        destination: String,
        #[serde(default)]
        start: Option<String>,
    },
    /// Current status record
    Status,
    /// Map nodes, edges and layout
    Map,
    /// All registered tags
    ListTags,
    /// One tag
    GetTag {
        #[serde(default, alias = "tagId")]
        tag_id: String,
    },
    /// Register a tag
    RegisterTag {
        #[serde(default, alias = "tagId")]
        tag_id: String,
        #[serde(default, alias = "itemName")]
        item_name: String,
    },
    /// Change a tag's item name
    RenameTag {
        #[serde(default, alias = "tagId")]
        tag_id: String,
        #[serde(default, alias = "itemName")]
        item_name: String,
    },
    /// Remove a tag
    DeleteTag {
        #[serde(default, alias = "tagId")]
        tag_id: String,
    },
}

/// Reply to an [`ApiRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    /// HTTP-like status code
    pub status: u16,
    /// JSON body
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        ApiResponse { status: 200, body }
    }

    pub fn created(body: Value) -> Self {
        ApiResponse { status: 201, body }
    }

    pub fn error(status: u16, message: impl ToString) -> Self {
        ApiResponse {
            status,
            body: json!({ "error": message.to_string() }),
        }
    }

    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl From<RouteError> for ApiResponse {
    fn from(e: RouteError) -> Self {
        let status = match e {
            RouteError::RouteNotFound { .. } => 404,
            RouteError::CommandLengthMismatch { .. } => 500,
            RouteError::PublishFailed(_) => 502,
        };
        ApiResponse::error(status, e)
    }
}

impl From<TagError> for ApiResponse {
    fn from(e: TagError) -> Self {
        let status = match e {
            TagError::MissingField(_) => 400,
            TagError::NotFound(_) => 404,
            TagError::AlreadyRegistered(_) => 409,
            TagError::Io(_) | TagError::Json(_) => {
                error!("Tag storage failure: {}", e);
                500
            }
        };
        ApiResponse::error(status, e)
    }
}

/// Dispatches client requests to the route controller, status record and tag registry
#[derive(Clone)]
pub struct Api {
    controller: Arc<RouteController>,
    status: SharedStatus,
    tags: Arc<Mutex<TagRegistry>>,
}

impl Api {
    pub fn new(
        controller: Arc<RouteController>,
        status: SharedStatus,
        tags: Arc<Mutex<TagRegistry>>,
    ) -> Self {
        Api {
            controller,
            status,
            tags,
        }
    }

    /// Serve one request
    pub fn handle(&self, request: ApiRequest) -> ApiResponse {
        debug!("API request: {:?}", request);
        match request {
            ApiRequest::Route { destination, start } => {
                if destination.is_empty() {
                    return ApiResponse::error(400, "destination is required");
                }
                let request = RouteRequest { destination, start };
                match self.controller.request_route(&request) {
                    Ok(route) => to_body(&route),
                    Err(e) => e.into(),
                }
            }
            ApiRequest::Status => to_body(&self.status.snapshot()),
            ApiRequest::Map => self.map(),
            ApiRequest::ListTags => to_body(&self.lock_tags().list()),
            ApiRequest::GetTag { tag_id } => match self.lock_tags().get(&tag_id) {
                Some(tag) => to_body(&tag),
                None => TagError::NotFound(tag_id).into(),
            },
            ApiRequest::RegisterTag { tag_id, item_name } => {
                match self.lock_tags().register(&tag_id, &item_name) {
                    Ok(tag) => match serde_json::to_value(&tag) {
                        Ok(body) => ApiResponse::created(body),
                        Err(e) => ApiResponse::error(500, e),
                    },
                    Err(e) => e.into(),
                }
            }
            ApiRequest::RenameTag { tag_id, item_name } => {
                match self.lock_tags().rename(&tag_id, &item_name) {
                    Ok(tag) => to_body(&tag),
                    Err(e) => e.into(),
                }
            }
            ApiRequest::DeleteTag { tag_id } => match self.lock_tags().delete(&tag_id) {
                Ok(tag) => to_body(&tag),
                Err(e) => e.into(),
            },
        }
    }

    /// Parse a raw JSON request and serve it; malformed requests get a 400
    pub fn handle_value(&self, request: Value) -> ApiResponse {
        match serde_json::from_value::<ApiRequest>(request) {
            Ok(request) => self.handle(request),
            Err(e) => ApiResponse::error(400, format!("Invalid request: {}", e)),
        }
    }

    fn map(&self) -> ApiResponse {
        let topology = self.controller.planner().topology();
        let nodes: Vec<Value> = topology
            .graph
            .nodes()
            .map(|node| {
                let position = topology.layout.get(node);
                json!({
                    "name": node,
                    "x": position.map(|p| p.x),
                    "y": position.map(|p| p.y),
                })
            })
            .collect();
        let edges: Vec<Value> = topology
            .graph
            .nodes()
            .flat_map(|from| {
                topology
                    .graph
                    .neighbors(from.as_str())
                    .map(move |(to, weight)| json!({ "from": from, "to": to, "weight": weight }))
            })
            .collect();
        let tracker = self.controller.position();

        ApiResponse::ok(json!({
            "home": topology.home,
            "nodes": nodes,
            "edges": edges,
            "previous": tracker.current_previous(),
            "current": tracker.current_node(),
        }))
    }

    fn lock_tags(&self) -> MutexGuard<'_, TagRegistry> {
        match self.tags.lock() {
            Ok(tags) => tags,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn to_body<T: Serialize>(value: &T) -> ApiResponse {
    match serde_json::to_value(value) {
        Ok(body) => ApiResponse::ok(body),
        Err(e) => ApiResponse::error(500, e),
    }
}
