//! Graph layer - entities, relations, neighborhood expansion

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::model::{Entity, EntityInput, Relation, RelationType};
use crate::store::Store;

/// An entity together with its relations, as returned by graph search
#[derive(Debug, Clone)]
pub struct GraphHit {
    pub entity: Entity,
    pub relations: Vec<Relation>,
}

/// Knowledge graph service
pub struct GraphLayer {
    store: Arc<Store>,
}

impl GraphLayer {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Create an entity or fold observations into an existing one
    pub fn create_entity(&self, project_id: &str, input: &EntityInput) -> Result<Entity> {
        self.store.entity_upsert(project_id, input)
    }

    /// Lookup by id
    pub fn get_entity(&self, id: &str) -> Result<Option<Entity>> {
        self.store.entity_get(id)
    }

    /// Create a directed relation between two entities
    pub fn create_relation(
        &self,
        project_id: &str,
        from_entity_id: &str,
        to_entity_id: &str,
        relation_type: RelationType,
        properties: HashMap<String, serde_json::Value>,
    ) -> Result<Relation> {
        self.store
            .relation_insert(project_id, from_entity_id, to_entity_id, relation_type, properties)
    }

    /// Search entities by name/observation substring, each hit carrying its
    /// relations for context.
    pub fn search(&self, project_id: &str, query: &str, k: usize) -> Result<Vec<GraphHit>> {
        if k == 0 {
            return Ok(vec![]);
        }
        let entities = self.store.entity_search(project_id, query, k)?;
        let mut hits = Vec::with_capacity(entities.len());
        for entity in entities {
            let relations = self.store.relations_for_entity(&entity.id)?;
            hits.push(GraphHit { entity, relations });
        }
        Ok(hits)
    }

    /// One-hop neighborhood around a seed set (tier-2 expansion)
    pub fn neighbors(&self, entity_ids: &[String]) -> Result<Vec<Entity>> {
        self.store.entity_neighbors(entity_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityType;
    use crate::store::test_util::test_store;

    #[test]
    fn search_carries_relations() {
        let (store, _dir) = test_store();
        let project = store.project_upsert("p", None).unwrap();
        let layer = GraphLayer::new(store);

        let api = layer
            .create_entity(
                &project.id,
                &EntityInput {
                    name: "api-gateway".into(),
                    entity_type: EntityType::Component,
                    observations: vec!["fronts all traffic".into()],
                    importance: 0.7,
                },
            )
            .unwrap();
        let auth = layer
            .create_entity(
                &project.id,
                &EntityInput {
                    name: "auth".into(),
                    entity_type: EntityType::Component,
                    observations: vec![],
                    importance: 0.6,
                },
            )
            .unwrap();
        layer
            .create_relation(
                &project.id,
                &api.id,
                &auth.id,
                RelationType::DependsOn,
                Default::default(),
            )
            .unwrap();

        let hits = layer.search(&project.id, "gateway", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].relations.len(), 1);

        let neighborhood = layer.neighbors(&[api.id]).unwrap();
        assert_eq!(neighborhood.len(), 1);
        assert_eq!(neighborhood[0].name, "auth");
    }
}
