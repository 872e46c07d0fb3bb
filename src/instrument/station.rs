//! The experiment station: every live instrument connection, by name and role.
//!
//! A `Station` is built once by the caller and passed explicitly to each procedure.
//! Discovery is a capability query (`with_role`) rather than inspection of concrete
//! driver types.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::{Cryostat, LockIn, SourceMeter};
use crate::error::{AppResult, DaqError};

/// Role an attached component plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Source-measure unit.
    SourceMeter,
    /// Lock-in amplifier.
    LockIn,
    /// Cryostat / magnet controller.
    Cryostat,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Role::SourceMeter => "source-measure unit",
            Role::LockIn => "lock-in amplifier",
            Role::Cryostat => "cryostat",
        };
        f.write_str(label)
    }
}

/// Erased instrument handle stored in the station.
#[derive(Clone)]
pub enum Component {
    /// Source-measure unit.
    SourceMeter(Arc<dyn SourceMeter>),
    /// Lock-in amplifier.
    LockIn(Arc<dyn LockIn>),
    /// Cryostat.
    Cryostat(Arc<dyn Cryostat>),
}

impl Component {
    /// Role of this component.
    pub fn role(&self) -> Role {
        match self {
            Component::SourceMeter(_) => Role::SourceMeter,
            Component::LockIn(_) => Role::LockIn,
            Component::Cryostat(_) => Role::Cryostat,
        }
    }
}

/// Named instrument registry, in insertion order.
#[derive(Clone, Default)]
pub struct Station {
    order: Vec<String>,
    components: BTreeMap<String, Component>,
}

impl Station {
    /// Empty station.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component. Re-adding a name replaces the previous component.
    pub fn add(&mut self, name: impl Into<String>, component: Component) -> &mut Self {
        let name = name.into();
        if self.components.insert(name.clone(), component).is_none() {
            self.order.push(name);
        } else {
            tracing::warn!(component = %name, "Replacing station component");
        }
        self
    }

    /// Builder-style [`Station::add`].
    pub fn with(mut self, name: impl Into<String>, component: Component) -> Self {
        self.add(name, component);
        self
    }

    /// Names of all components playing `role`, in insertion order.
    pub fn with_role(&self, role: Role) -> Vec<&str> {
        self.order
            .iter()
            .filter(|name| {
                self.components
                    .get(name.as_str())
                    .is_some_and(|c| c.role() == role)
            })
            .map(String::as_str)
            .collect()
    }

    /// All attached lock-ins with their names, in insertion order.
    pub fn lockins(&self) -> Vec<(&str, Arc<dyn LockIn>)> {
        self.order
            .iter()
            .filter_map(|name| match self.components.get(name) {
                Some(Component::LockIn(lockin)) => Some((name.as_str(), Arc::clone(lockin))),
                _ => None,
            })
            .collect()
    }

    /// The single source-measure unit.
    pub fn source_meter(&self) -> AppResult<Arc<dyn SourceMeter>> {
        match self.unique(Role::SourceMeter)? {
            Component::SourceMeter(smu) => Ok(Arc::clone(smu)),
            _ => unreachable_role(Role::SourceMeter),
        }
    }

    /// The single cryostat.
    pub fn cryostat(&self) -> AppResult<Arc<dyn Cryostat>> {
        match self.unique(Role::Cryostat)? {
            Component::Cryostat(cryostat) => Ok(Arc::clone(cryostat)),
            _ => unreachable_role(Role::Cryostat),
        }
    }

    fn unique(&self, role: Role) -> AppResult<&Component> {
        let names = self.with_role(role);
        match names.as_slice() {
            [name] => self
                .components
                .get(*name)
                .ok_or_else(|| DaqError::Configuration(format!("{role} '{name}' vanished"))),
            [] => Err(DaqError::Configuration(format!(
                "no {role} attached to the station"
            ))),
            many => Err(DaqError::Configuration(format!(
                "expected exactly one {role}, found {}: {}",
                many.len(),
                many.join(", ")
            ))),
        }
    }
}

fn unreachable_role<T>(role: Role) -> AppResult<T> {
    Err(DaqError::Configuration(format!(
        "component registered as {role} has a different type"
    )))
}

impl fmt::Debug for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.order
                    .iter()
                    .filter_map(|n| self.components.get(n).map(|c| (n, c.role()))),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::mock::{MockCryostat, MockLockIn, MockSourceMeter};

    fn station() -> Station {
        Station::new()
            .with("mf1", Component::LockIn(Arc::new(MockLockIn::constant(1.0, 0.0))))
            .with("keithley", Component::SourceMeter(Arc::new(MockSourceMeter::new())))
            .with("mf2", Component::LockIn(Arc::new(MockLockIn::constant(2.0, 0.0))))
            .with("triton", Component::Cryostat(Arc::new(MockCryostat::new(0.01, 0.0))))
    }

    #[test]
    fn role_query_keeps_insertion_order() {
        let station = station();
        assert_eq!(station.with_role(Role::LockIn), vec!["mf1", "mf2"]);
        let names: Vec<_> = station.lockins().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["mf1", "mf2"]);
    }

    #[test]
    fn unique_role_lookup() {
        let station = station();
        assert!(station.source_meter().is_ok());
        assert!(station.cryostat().is_ok());

        let empty = Station::new();
        assert!(matches!(
            empty.source_meter(),
            Err(DaqError::Configuration(_))
        ));
    }

    #[test]
    fn duplicate_role_is_rejected() {
        let station = station().with(
            "keithley2",
            Component::SourceMeter(Arc::new(MockSourceMeter::new())),
        );
        let err = station.source_meter().err().map(|e| e.to_string());
        assert!(err.is_some_and(|e| e.contains("exactly one")));
    }
}
