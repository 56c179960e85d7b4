//! Surface materials and per-pair contact parameters.

use std::collections::HashMap;

use crate::error::PhysicsError;

/// Index of a material registered with a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MaterialId(pub(crate) usize);

/// Per-body surface properties. Unset values fall back to the world default.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Material {
    pub name: String,
    pub friction: Option<f32>,
    pub restitution: Option<f32>,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = Some(friction);
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = Some(restitution);
        self
    }

    /// Friction must be non-negative and restitution within [0, 1], so
    /// products of two materials stay in range too.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if let Some(friction) = self.friction {
            if !(friction.is_finite() && friction >= 0.0) {
                return Err(format!(
                    "material {:?}: friction must be non-negative, got {friction}",
                    self.name
                ));
            }
        }
        if let Some(restitution) = self.restitution {
            if !(0.0..=1.0).contains(&restitution) {
                return Err(format!(
                    "material {:?}: restitution must be in [0, 1], got {restitution}",
                    self.name
                ));
            }
        }
        Ok(())
    }
}

/// Parameters of the contact and friction equations between two materials.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactMaterial {
    pub friction: f32,
    pub restitution: f32,
    pub contact_stiffness: f32,
    pub contact_relaxation: f32,
    pub friction_stiffness: f32,
    pub friction_relaxation: f32,
}

impl Default for ContactMaterial {
    fn default() -> Self {
        Self {
            friction: 0.3,
            restitution: 0.0,
            contact_stiffness: 1e7,
            contact_relaxation: 3.0,
            friction_stiffness: 1e7,
            friction_relaxation: 3.0,
        }
    }
}

impl ContactMaterial {
    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if !(self.friction.is_finite() && self.friction >= 0.0) {
            return Err(format!("friction must be non-negative, got {}", self.friction));
        }
        if !(0.0..=1.0).contains(&self.restitution) {
            return Err(format!("restitution must be in [0, 1], got {}", self.restitution));
        }
        for (name, value) in [
            ("contact_stiffness", self.contact_stiffness),
            ("contact_relaxation", self.contact_relaxation),
            ("friction_stiffness", self.friction_stiffness),
            ("friction_relaxation", self.friction_relaxation),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(format!("{name} must be positive, got {value}"));
            }
        }
        Ok(())
    }
}

/// Registered materials and pair overrides.
#[derive(Debug, Clone, Default)]
pub struct MaterialTable {
    materials: Vec<Material>,
    pairs: HashMap<(MaterialId, MaterialId), ContactMaterial>,
}

impl MaterialTable {
    pub fn add(&mut self, material: Material) -> Result<MaterialId, PhysicsError> {
        material.validate().map_err(PhysicsError::InvalidConfig)?;
        self.materials.push(material);
        Ok(MaterialId(self.materials.len() - 1))
    }

    pub fn get(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0)
    }

    pub fn contains(&self, id: MaterialId) -> bool {
        id.0 < self.materials.len()
    }

    pub fn set_pair(
        &mut self,
        a: MaterialId,
        b: MaterialId,
        contact: ContactMaterial,
    ) -> Result<(), PhysicsError> {
        for id in [a, b] {
            if !self.contains(id) {
                return Err(PhysicsError::UnknownMaterial(id));
            }
        }
        contact.validate().map_err(PhysicsError::InvalidConfig)?;
        self.pairs.insert(pair_key(a, b), contact);
        Ok(())
    }

    /// Contact parameters for two bodies.
    ///
    /// Pair override first; otherwise the default with friction and restitution
    /// replaced by the product of both materials' values where both define one.
    pub fn resolve(
        &self,
        a: Option<MaterialId>,
        b: Option<MaterialId>,
        default: &ContactMaterial,
    ) -> ContactMaterial {
        let (Some(a), Some(b)) = (a, b) else {
            return *default;
        };
        if let Some(contact) = self.pairs.get(&pair_key(a, b)) {
            return *contact;
        }

        let mut contact = *default;
        if let (Some(ma), Some(mb)) = (self.get(a), self.get(b)) {
            if let (Some(fa), Some(fb)) = (ma.friction, mb.friction) {
                contact.friction = fa * fb;
            }
            if let (Some(ra), Some(rb)) = (ma.restitution, mb.restitution) {
                contact.restitution = ra * rb;
            }
        }
        contact
    }
}

fn pair_key(a: MaterialId, b: MaterialId) -> (MaterialId, MaterialId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
