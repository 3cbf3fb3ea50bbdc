// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Answers peers' requests for one open slice.

use std::sync::Arc;

use tracing::trace;

use super::SliceShared;
use crate::metrics;
use crate::name::Name;
use crate::protocol::{self, Request};
use crate::transport::{RequestHandler, Transport};

pub(super) struct SliceResponder {
    shared: Arc<SliceShared>,
}

impl SliceResponder {
    /// Start answering both exchanges for the slice.
    pub(super) fn register(transport: &dyn Transport, shared: &Arc<SliceShared>) {
        let handler: Arc<dyn RequestHandler> = Arc::new(Self {
            shared: Arc::clone(shared),
        });
        transport.respond_if_requested(protocol::root_advise_name(&shared.slice), Arc::clone(&handler));
        transport.respond_if_requested(protocol::node_fetch_prefix(&shared.slice), handler);
    }

    pub(super) fn unregister(transport: &dyn Transport, shared: &SliceShared) {
        transport.stop_responding(&protocol::root_advise_name(&shared.slice));
        transport.stop_responding(&protocol::node_fetch_prefix(&shared.slice));
    }
}

impl RequestHandler for SliceResponder {
    fn handle(&self, name: &Name) -> Option<Vec<u8>> {
        let slice = &self.shared.slice;
        let request = protocol::parse_request(slice.topology(), name)?;
        if request.slice_hash() != slice.hash() {
            return None;
        }
        let content = match request {
            // Nothing published yet: let someone else answer
            Request::RootAdvise { .. } => {
                let root = *self.shared.local_root.read();
                root.and_then(|root| self.shared.cache.get_encoded(&root))
            }
            Request::NodeFetch { digest, .. } => self.shared.cache.get_encoded(&digest),
        };
        metrics::record_request_served(request.exchange(), content.is_some());
        trace!(%name, answered = content.is_some(), "Handled sync request");
        content
    }
}
