//! Named UI components with a shared start/stop/shutdown lifecycle.

use std::any::Any;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    Stopped,
    Started,
    Paused,
}

pub trait Component: Any + Send {
    fn name(&self) -> &'static str;

    fn start(&mut self) {}

    fn stop(&mut self) {}

    /// Periodic refresh while started.
    fn update(&mut self) {}

    fn shutdown(&mut self) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct Registered {
    component: Box<dyn Component>,
    state: ComponentState,
}

/// Components start in registration order and stop in reverse.
#[derive(Default)]
pub struct ComponentRegistry {
    components: Vec<Registered>,
    shut_down: bool,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component. A component with the same name is replaced.
    pub fn register(&mut self, component: impl Component) {
        let name = component.name();
        let entry = Registered {
            component: Box::new(component),
            state: ComponentState::Stopped,
        };
        match self.components.iter_mut().find(|r| r.component.name() == name) {
            Some(existing) => {
                tracing::warn!("Component {} registered twice, replacing", name);
                *existing = entry;
            }
            None => self.components.push(entry),
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.components.iter().map(|r| r.component.name()).collect()
    }

    pub fn state(&self, name: &str) -> Option<ComponentState> {
        self.components
            .iter()
            .find(|r| r.component.name() == name)
            .map(|r| r.state)
    }

    pub fn start_all(&mut self) {
        for r in &mut self.components {
            if r.state != ComponentState::Started {
                tracing::debug!("Starting component {}", r.component.name());
                r.component.start();
                r.state = ComponentState::Started;
            }
        }
    }

    pub fn stop_all(&mut self) {
        for r in self.components.iter_mut().rev() {
            if r.state != ComponentState::Stopped {
                tracing::debug!("Stopping component {}", r.component.name());
                r.component.stop();
                r.state = ComponentState::Stopped;
            }
        }
    }

    pub fn pause(&mut self, name: &str) {
        if let Some(r) = self.components.iter_mut().find(|r| r.component.name() == name) {
            if r.state == ComponentState::Started {
                r.state = ComponentState::Paused;
            }
        }
    }

    pub fn resume(&mut self, name: &str) {
        if let Some(r) = self.components.iter_mut().find(|r| r.component.name() == name) {
            if r.state == ComponentState::Paused {
                r.state = ComponentState::Started;
            }
        }
    }

    /// Call `update` on every started component.
    pub fn update_all(&mut self) {
        for r in &mut self.components {
            if r.state == ComponentState::Started {
                r.component.update();
            }
        }
    }

    /// Stop everything, then call each `shutdown` hook. Only the first call
    /// does anything; returns whether this call did the work.
    pub fn shutdown(&mut self) -> bool {
        if self.shut_down {
            return false;
        }
        self.stop_all();
        for r in &mut self.components {
            r.component.shutdown();
        }
        self.shut_down = true;
        true
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn get<T: Component>(&self) -> Option<&T> {
        self.components
            .iter()
            .find_map(|r| r.component.as_any().downcast_ref::<T>())
    }

    pub fn get_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.components
            .iter_mut()
            .find_map(|r| r.component.as_any_mut().downcast_mut::<T>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Probe {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        updates: usize,
    }

    impl Probe {
        fn new(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name,
                log: log.clone(),
                updates: 0,
            }
        }

        fn record(&self, event: &str) {
            self.log.lock().unwrap().push(format!("{}:{}", self.name, event));
        }
    }

    impl Component for Probe {
        fn name(&self) -> &'static str {
            self.name
        }
        fn start(&mut self) {
            self.record("start");
        }
        fn stop(&mut self) {
            self.record("stop");
        }
        fn update(&mut self) {
            self.updates += 1;
        }
        fn shutdown(&mut self) {
            self.record("shutdown");
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn test_start_stop_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ComponentRegistry::new();
        registry.register(Probe::new("a", &log));
        registry.register(Probe::new("b", &log));

        registry.start_all();
        registry.start_all();
        assert_eq!(registry.state("a"), Some(ComponentState::Started));
        registry.stop_all();
        registry.stop_all();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:start", "b:start", "b:stop", "a:stop"]
        );
        assert_eq!(registry.state("b"), Some(ComponentState::Stopped));
        assert_eq!(registry.state("c"), None);
    }

    #[test]
    fn test_update_only_started_and_pause() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ComponentRegistry::new();
        registry.register(Probe::new("a", &log));
        registry.update_all();
        registry.start_all();
        registry.update_all();
        registry.pause("a");
        assert_eq!(registry.state("a"), Some(ComponentState::Paused));
        registry.update_all();
        registry.resume("a");
        registry.update_all();
        assert_eq!(registry.get::<Probe>().unwrap().updates, 2);
        registry.get_mut::<Probe>().unwrap().updates = 0;
        assert_eq!(registry.get::<Probe>().unwrap().updates, 0);
    }

    #[test]
    fn test_shutdown_runs_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ComponentRegistry::new();
        registry.register(Probe::new("a", &log));
        registry.start_all();
        assert!(registry.shutdown());
        assert!(!registry.shutdown());
        assert!(registry.is_shut_down());
        assert_eq!(*log.lock().unwrap(), vec!["a:start", "a:stop", "a:shutdown"]);
    }
}
