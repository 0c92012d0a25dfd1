use paddy_model_provider::Capability;
use std::sync::Arc;

pub type AppState = Arc<State>;

pub struct State {
    pub capability: Capability,
}

impl State {
    pub fn new(capability: Capability) -> Self {
        Self { capability }
    }

    pub fn backend_available(&self) -> bool {
        self.capability.is_available()
    }
}
