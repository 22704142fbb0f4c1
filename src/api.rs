//! In-process action dispatch: named operations on typed nodes, resolved
//! through handler tables with an access-policy gate.

use crate::tree::{NodeId, NodeKind, Store};
use serde_json::{json, Value as Json};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub body: Json,
}

impl Response {
    pub fn ok(result: Json) -> Self {
        Response {
            code: 200,
            body: json!({ "result": result }),
        }
    }

    pub fn error(code: u16, message: &str) -> Self {
        tracing::warn!(code, message, "dispatch error");
        Response {
            code,
            body: json!({ "code": code, "error": message }),
        }
    }
}

pub type ConstHandler<C> = Box<dyn Fn(&C, &Store, NodeId, &Json) -> Response>;
pub type MutHandler<C> = Box<dyn Fn(&C, &mut Store, NodeId, &Json) -> Response>;
pub type Policy<C> = Box<dyn Fn(&C, &Store, NodeId, &Json) -> bool>;

pub struct Dispatcher<C> {
    const_handlers: BTreeMap<String, ConstHandler<C>>,
    mut_handlers: BTreeMap<String, MutHandler<C>>,
    can_call_const: Policy<C>,
    can_call_mut: Policy<C>,
}

impl<C> Default for Dispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Dispatcher<C> {
    /// Read actions are allowed by default; mutating actions are denied
    /// until a policy is installed.
    pub fn new() -> Self {
        Dispatcher {
            const_handlers: BTreeMap::new(),
            mut_handlers: BTreeMap::new(),
            can_call_const: Box::new(|_, _, _, _| true),
            can_call_mut: Box::new(|_, _, _, _| false),
        }
    }

    /// Dispatcher with the built-in actions: `get` serializes any node,
    /// `list` maps every key of a container to its serialized element.
    pub fn with_builtins() -> Self {
        let mut d = Self::new();
        d.register_const("get", |_, store, node, _| {
            match store.serialize_node(node) {
                Ok(j) => Response::ok(j),
                Err(_) => Response::error(500, "serialization failed"),
            }
        });
        d.register_const("list", |_, store, node, _| {
            if !matches!(store.nodes[node].kind, NodeKind::Container(_)) {
                return Response::error(400, "Bad Request");
            }
            match store.entry_snapshots(node) {
                Ok(entries) => {
                    let mut obj = serde_json::Map::new();
                    for (key, value) in entries {
                        obj.insert(key.to_string(), value);
                    }
                    Response::ok(Json::Object(obj))
                }
                Err(_) => Response::error(500, "serialization failed"),
            }
        });
        d
    }

    pub fn register_const(
        &mut self,
        name: impl Into<String>,
        handler: impl Fn(&C, &Store, NodeId, &Json) -> Response + 'static,
    ) {
        self.const_handlers.insert(name.into(), Box::new(handler));
    }

    pub fn register_mut(
        &mut self,
        name: impl Into<String>,
        handler: impl Fn(&C, &mut Store, NodeId, &Json) -> Response + 'static,
    ) {
        self.mut_handlers.insert(name.into(), Box::new(handler));
    }

    pub fn set_const_policy(&mut self, policy: impl Fn(&C, &Store, NodeId, &Json) -> bool + 'static) {
        self.can_call_const = Box::new(policy);
    }

    pub fn set_mut_policy(&mut self, policy: impl Fn(&C, &Store, NodeId, &Json) -> bool + 'static) {
        self.can_call_mut = Box::new(policy);
    }

    /// Registered action names: `(const, mutating)`.
    pub fn list_actions(&self) -> (Vec<String>, Vec<String>) {
        (
            self.const_handlers.keys().cloned().collect(),
            self.mut_handlers.keys().cloned().collect(),
        )
    }

    pub fn dispatch(
        &self,
        context: &C,
        store: &mut Store,
        node: Option<NodeId>,
        request: &Json,
    ) -> Response {
        let Some(node) = node else {
            return Response::error(404, "Not Found");
        };
        let Some(obj) = request.as_object() else {
            return Response::error(400, "Bad Request");
        };
        let Some(action) = obj.get("action").and_then(Json::as_str) else {
            return Response::error(400, "Bad Request");
        };
        if let Some(handler) = self.const_handlers.get(action) {
            if !(self.can_call_const)(context, store, node, request) {
                return Response::error(403, "Forbidden");
            }
            return handler(context, store, node, request);
        }
        if let Some(handler) = self.mut_handlers.get(action) {
            if !(self.can_call_mut)(context, store, node, request) {
                return Response::error(403, "Forbidden");
            }
            return handler(context, store, node, request);
        }
        Response::error(404, "Not Found")
    }
}
