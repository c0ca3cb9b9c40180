//! Elements and the element registry: the addressable structure this node
//! registers with the management service.
use crate::access::ModelIdentifier;
use crate::address::{Address, UnicastAddress};
use crate::interface::ElementConfigEntry;
use crate::mesh::{
    ElementCount, ElementIndex, ModelId, APP_COMPANY_ID, APP_PRODUCT_ID, APP_VERSION_ID,
};
use crate::mesh::CompanyId;
use crate::models::{Model, ModelConfigUpdate, Outbound};
use crate::router::KeyHandle;
use core::time::Duration;
use slog::{info, warn, Logger};
use std::collections::BTreeMap;

/// Free-form capability options reported per model at registration.
pub type ModelOptions = BTreeMap<String, serde_json::Value>;

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ModelDescriptor {
    pub identifier: ModelIdentifier,
    pub options: ModelOptions,
}

/// Per-element registration entry: SIG and vendor models are reported as
/// separate lists, each in insertion order.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ElementDescriptor {
    pub index: ElementIndex,
    pub sig_models: Vec<ModelDescriptor>,
    pub vendor_models: Vec<ModelDescriptor>,
}

/// The registration payload sent during attach/join.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Composition {
    pub company_id: CompanyId,
    pub product_id: u16,
    pub version_id: u16,
    pub elements: Vec<ElementDescriptor>,
}

/// The effect a configuration update had on one model's publication timer.
/// `period == None` means the timer must be disarmed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublicationUpdate {
    pub element: ElementIndex,
    pub model: ModelIdentifier,
    pub period: Option<Duration>,
}

/// An addressable sub-unit of the node hosting an ordered set of models.
pub struct Element {
    index: ElementIndex,
    models: Vec<Box<dyn Model>>,
}
impl Element {
    #[must_use]
    pub fn new(index: ElementIndex) -> Element {
        Element {
            index,
            models: Vec::new(),
        }
    }
    #[must_use]
    pub fn index(&self) -> ElementIndex {
        self.index
    }
    /// Registers a model. Registration order is preserved and reported.
    /// # Panics
    /// Panics if a model with the same `ModelId` is already registered.
    pub fn add_model(&mut self, model: Box<dyn Model>) {
        let id = model.identifier().model_id();
        assert!(
            self.model(id).is_none(),
            "duplicate model id {} on element {}",
            id,
            self.index
        );
        self.models.push(model);
    }
    #[must_use]
    pub fn model(&self, model_id: ModelId) -> Option<&dyn Model> {
        self.models
            .iter()
            .find(|m| m.identifier().model_id() == model_id)
            .map(AsRef::as_ref)
    }
    /// Looks a model up by id alone; the vendor qualifier is ignored.
    pub fn model_mut(&mut self, model_id: ModelId) -> Option<&mut (dyn Model + 'static)> {
        self.models
            .iter_mut()
            .find(|m| m.identifier().model_id() == model_id)
            .map(AsMut::as_mut)
    }

    /// Delivers one inbound message to every model on this element. Each
    /// model decides independently whether to act; replies from all models
    /// are collected in registration order.
    pub fn route_message(
        &mut self,
        source: UnicastAddress,
        key: KeyHandle,
        destination: &Address,
        payload: &[u8],
    ) -> Vec<Outbound> {
        let mut outbound = Vec::new();
        for model in &mut self.models {
            outbound.extend(model.process_message(source, destination, key, payload));
        }
        outbound
    }

    /// Applies a configuration update to the model with `model_id`. Returns
    /// the resulting publication-timer change, or `None` when no such model
    /// exists on this element.
    pub fn update_model_config(
        &mut self,
        model_id: ModelId,
        update: &ModelConfigUpdate,
        log: &Logger,
    ) -> Option<PublicationUpdate> {
        let index = self.index;
        let model = self.model_mut(model_id)?;
        let identifier = model.identifier();
        if let Err(err) = model.apply_config(update) {
            // The update itself stands; only publication stays disarmed.
            warn!(log, "model rejected publication setup";
                "element" => %index, "model" => %identifier, "error" => %err);
            return Some(PublicationUpdate {
                element: index,
                model: identifier,
                period: None,
            });
        }
        info!(log, "model configuration updated";
            "element" => %index, "model" => %identifier);
        Some(PublicationUpdate {
            element: index,
            model: identifier,
            period: model.publication_period(),
        })
    }

    fn models_where(&self, sig: bool) -> Vec<ModelDescriptor> {
        self.models
            .iter()
            .map(|m| m.identifier())
            .filter(|identifier| identifier.is_sig() == sig)
            .map(|identifier| ModelDescriptor {
                identifier,
                options: ModelOptions::new(),
            })
            .collect()
    }
    #[must_use]
    pub fn describe(&self) -> ElementDescriptor {
        ElementDescriptor {
            index: self.index,
            sig_models: self.models_where(true),
            vendor_models: self.models_where(false),
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, thiserror::Error)]
#[error("an element with index {0} is already registered")]
pub struct DuplicateElementIndex(pub ElementIndex);

/// Ordered set of elements, indexed by element index. This is the unit
/// attached to the network-management service.
#[derive(Default)]
pub struct ElementRegistry {
    elements: Vec<Element>,
}
impl ElementRegistry {
    #[must_use]
    pub fn new() -> ElementRegistry {
        ElementRegistry::default()
    }
    /// Registers an element, rejecting duplicate indices.
    pub fn add_element(&mut self, element: Element) -> Result<(), DuplicateElementIndex> {
        if self.element(element.index()).is_some() {
            return Err(DuplicateElementIndex(element.index()));
        }
        self.elements.push(element);
        Ok(())
    }
    #[must_use]
    pub fn element(&self, index: ElementIndex) -> Option<&Element> {
        self.elements.iter().find(|e| e.index() == index)
    }
    pub fn element_mut(&mut self, index: ElementIndex) -> Option<&mut Element> {
        self.elements.iter_mut().find(|e| e.index() == index)
    }
    #[must_use]
    pub fn element_count(&self) -> ElementCount {
        ElementCount(self.elements.len() as u8)
    }

    /// Fans the post-attach configuration out to elements and models.
    /// Unknown element indices or model ids are logged and skipped.
    pub fn apply_configuration(
        &mut self,
        configuration: &[ElementConfigEntry],
        log: &Logger,
    ) -> Vec<PublicationUpdate> {
        let mut updates = Vec::new();
        for entry in configuration {
            let element = match self.element_mut(entry.element_index) {
                Some(element) => element,
                None => {
                    warn!(log, "configuration for unknown element skipped";
                        "element" => %entry.element_index);
                    continue;
                }
            };
            for model_entry in &entry.models {
                match element.update_model_config(model_entry.model_id, &model_entry.config, log) {
                    Some(update) => updates.push(update),
                    None => warn!(log, "configuration for unknown model skipped";
                        "element" => %entry.element_index, "model" => %model_entry.model_id),
                }
            }
        }
        updates
    }

    /// Applies one configuration update pushed outside the attach reply.
    pub fn update_model_config(
        &mut self,
        element_index: ElementIndex,
        model_id: ModelId,
        update: &ModelConfigUpdate,
        log: &Logger,
    ) -> Option<PublicationUpdate> {
        match self.element_mut(element_index) {
            Some(element) => element.update_model_config(model_id, update, log),
            None => {
                warn!(log, "configuration for unknown element skipped";
                    "element" => %element_index);
                None
            }
        }
    }

    /// Builds the registration payload: per element, SIG and vendor model
    /// lists in registration order.
    #[must_use]
    pub fn describe_for_registration(&self) -> Composition {
        Composition {
            company_id: APP_COMPANY_ID,
            product_id: APP_PRODUCT_ID,
            version_id: APP_VERSION_ID,
            elements: self.elements.iter().map(Element::describe).collect(),
        }
    }
}
