//! # Module Router
//!
//! Static per-port registration of applications. Each route owns the
//! application and the capabilities it was issued for its port and channels.

use std::collections::BTreeMap;

use crate::domain::{CapabilityToken, ChannelError, ChannelId, PortId};
use crate::ports::ChannelModule;

struct Route {
    module: Box<dyn ChannelModule>,
    port_capability: CapabilityToken,
    channel_capabilities: BTreeMap<ChannelId, CapabilityToken>,
}

/// Port -> application registry.
#[derive(Default)]
pub struct ModuleRouter {
    routes: BTreeMap<PortId, Route>,
}

impl ModuleRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `module` on `port_id` with its port capability.
    pub fn add_route(
        &mut self,
        port_id: PortId,
        module: Box<dyn ChannelModule>,
        port_capability: CapabilityToken,
    ) -> Result<(), ChannelError> {
        if self.routes.contains_key(&port_id) {
            return Err(ChannelError::PortAlreadyBound(port_id));
        }
        self.routes.insert(
            port_id,
            Route {
                module,
                port_capability,
                channel_capabilities: BTreeMap::new(),
            },
        );
        Ok(())
    }

    /// Is a module routed for the port?
    pub fn has_route(&self, port_id: &PortId) -> bool {
        self.routes.contains_key(port_id)
    }

    /// Application bound to the port.
    pub fn module_mut(&mut self, port_id: &PortId) -> Result<&mut dyn ChannelModule, ChannelError> {
        match self.routes.get_mut(port_id) {
            Some(route) => Ok(route.module.as_mut()),
            None => Err(ChannelError::ModuleNotFound(port_id.clone())),
        }
    }

    /// Persist what every module staged during the committed transaction.
    pub fn commit_modules(&mut self) {
        for route in self.routes.values_mut() {
            route.module.on_commit();
        }
    }

    /// Discard what every module staged during the dropped transaction.
    pub fn rollback_modules(&mut self) {
        for route in self.routes.values_mut() {
            route.module.on_rollback();
        }
    }

    /// Port capability held by the routed module.
    pub fn port_capability(&self, port_id: &PortId) -> Option<&CapabilityToken> {
        self.routes.get(port_id).map(|route| &route.port_capability)
    }

    /// Channel capability held by the routed module.
    pub fn channel_capability(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Option<&CapabilityToken> {
        self.routes
            .get(port_id)
            .and_then(|route| route.channel_capabilities.get(channel_id))
    }

    /// Hand a freshly bound channel capability to the routed module.
    pub fn claim_channel_capability(
        &mut self,
        port_id: &PortId,
        channel_id: ChannelId,
        capability: CapabilityToken,
    ) -> Result<(), ChannelError> {
        let route = self
            .routes
            .get_mut(port_id)
            .ok_or_else(|| ChannelError::ModuleNotFound(port_id.clone()))?;
        route.channel_capabilities.insert(channel_id, capability);
        Ok(())
    }
}
