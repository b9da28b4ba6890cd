// src/task/lock.rs

use std::fmt;

/// Kind of domain object a lock reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    VirtualizationConnector,
    ApplianceManagerConnector,
    DistributedAppliance,
    VirtualSystem,
    DeploymentSpec,
    DistributedApplianceInstance,
    SecurityGroup,
    SecurityGroupInterface,
    SslConfiguration,
    Job,
    Email,
    Network,
    Archive,
    Alert,
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ObjectType::VirtualizationConnector => "Virtualization Connector",
            ObjectType::ApplianceManagerConnector => "Manager Connector",
            ObjectType::DistributedAppliance => "Distributed Appliance",
            ObjectType::VirtualSystem => "Virtual System",
            ObjectType::DeploymentSpec => "Deployment Specification",
            ObjectType::DistributedApplianceInstance => "Distributed Appliance Instance",
            ObjectType::SecurityGroup => "Security Group",
            ObjectType::SecurityGroupInterface => "Security Group Interface",
            ObjectType::SslConfiguration => "SSL Configuration",
            ObjectType::Job => "Job",
            ObjectType::Email | ObjectType::Network | ObjectType::Archive => "",
            ObjectType::Alert => "Alert",
        };
        f.write_str(label)
    }
}

/// Reference to a lockable domain object.
///
/// Two references are equal when they point at the same object, which is
/// what the engine's lock-overlap check compares.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockObjectReference {
    pub id: u64,
    pub name: String,
    pub object_type: ObjectType,
}

impl LockObjectReference {
    pub fn new(id: u64, name: impl Into<String>, object_type: ObjectType) -> Self {
        Self {
            id,
            name: name.into(),
            object_type,
        }
    }
}

impl fmt::Display for LockObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}' ({})", self.object_type, self.name, self.id)
    }
}
