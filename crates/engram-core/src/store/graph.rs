//! Knowledge graph persistence: entities and relations

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use std::collections::HashSet;
use uuid::Uuid;

use super::Store;
use crate::error::{map_constraint, EngineError, Result};
use crate::model::{Entity, EntityInput, EntityType, Relation, RelationType};

const ENTITY_COLUMNS: &str =
    "id, project_id, name, entity_type, observations, importance, created_at, updated_at";

fn row_to_entity(row: &rusqlite::Row<'_>) -> rusqlite::Result<Entity> {
    let entity_type: String = row.get(3)?;
    let observations: String = row.get(4)?;
    Ok(Entity {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        entity_type: EntityType::parse_name(&entity_type),
        observations: serde_json::from_str(&observations).unwrap_or_default(),
        importance: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn row_to_relation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Relation> {
    let relation_type: String = row.get(4)?;
    let properties: String = row.get(5)?;
    Ok(Relation {
        id: row.get(0)?,
        project_id: row.get(1)?,
        from_entity_id: row.get(2)?,
        to_entity_id: row.get(3)?,
        relation_type: RelationType::parse_name(&relation_type),
        properties: serde_json::from_str(&properties).unwrap_or_default(),
        created_at: row.get(6)?,
    })
}

impl Store {
    // ========================================================================
    // ENTITIES
    // ========================================================================

    /// Create an entity, or fold new observations into an existing one with
    /// the same (name, type).
    pub fn entity_upsert(&self, project_id: &str, input: &EntityInput) -> Result<Entity> {
        if input.name.trim().is_empty() {
            return Err(EngineError::InvalidArgument(
                "entity name cannot be empty".to_string(),
            ));
        }
        let name = input.name.trim();
        let now = Utc::now();

        if let Some(existing) =
            self.entity_get_by_name(project_id, name, Some(&input.entity_type))?
        {
            let mut observations = existing.observations.clone();
            for obs in &input.observations {
                if !observations.contains(obs) {
                    observations.push(obs.clone());
                }
            }
            let importance = existing.importance.max(input.importance.clamp(0.0, 1.0));
            let obs_json = serde_json::to_string(&observations).unwrap_or_else(|_| "[]".into());
            self.with_writer(|conn| {
                conn.execute(
                    "UPDATE entities SET observations = ?2, importance = ?3, updated_at = ?4
                     WHERE id = ?1",
                    params![existing.id, obs_json, importance, now],
                )?;
                Ok(())
            })?;
            self.bump_epoch(project_id);
            return Ok(Entity {
                observations,
                importance,
                updated_at: now,
                ..existing
            });
        }

        let entity = Entity {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            name: name.to_string(),
            entity_type: input.entity_type.clone(),
            observations: input.observations.clone(),
            importance: input.importance.clamp(0.0, 1.0),
            created_at: now,
            updated_at: now,
        };
        let obs_json = serde_json::to_string(&entity.observations).unwrap_or_else(|_| "[]".into());
        self.with_writer(|conn| {
            conn.execute(
                "INSERT INTO entities
                 (id, project_id, name, entity_type, observations, importance, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    entity.id,
                    entity.project_id,
                    entity.name,
                    entity.entity_type.as_str(),
                    obs_json,
                    entity.importance,
                    entity.created_at,
                    entity.updated_at,
                ],
            )
            .map_err(|e| map_constraint(e, "entity name"))?;
            Ok(())
        })?;
        self.bump_epoch(project_id);
        Ok(entity)
    }

    /// Look up by id
    pub fn entity_get(&self, id: &str) -> Result<Option<Entity>> {
        self.with_reader(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM entities WHERE id = ?1", ENTITY_COLUMNS),
                params![id],
                row_to_entity,
            )
            .optional()
            .map_err(EngineError::from)
        })
    }

    /// Look up by name, optionally narrowed to a type
    pub fn entity_get_by_name(
        &self,
        project_id: &str,
        name: &str,
        entity_type: Option<&EntityType>,
    ) -> Result<Option<Entity>> {
        self.with_reader(|conn| {
            match entity_type {
                Some(t) => conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM entities
                             WHERE project_id = ?1 AND name = ?2 AND entity_type = ?3",
                            ENTITY_COLUMNS
                        ),
                        params![project_id, name, t.as_str()],
                        row_to_entity,
                    )
                    .optional(),
                None => conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM entities WHERE project_id = ?1 AND name = ?2
                             ORDER BY importance DESC LIMIT 1",
                            ENTITY_COLUMNS
                        ),
                        params![project_id, name],
                        row_to_entity,
                    )
                    .optional(),
            }
            .map_err(EngineError::from)
        })
    }

    /// Token search across entity names and observations: an entity matches
    /// when any query token over two characters appears in either.
    pub fn entity_search(&self, project_id: &str, query: &str, k: usize) -> Result<Vec<Entity>> {
        let tokens: Vec<String> = query
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric() && c != '-' && c != '_' && c != '.')
            .filter(|t| t.len() > 2)
            .map(|t| format!("%{}%", t))
            .collect();
        if tokens.is_empty() || k == 0 {
            return Ok(vec![]);
        }
        let mut clauses = Vec::with_capacity(tokens.len());
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(project_id.to_string())];
        for token in tokens {
            args.push(Box::new(token));
            clauses.push(format!(
                "LOWER(name) LIKE ?{n} OR LOWER(observations) LIKE ?{n}",
                n = args.len()
            ));
        }
        let sql = format!(
            "SELECT {} FROM entities
             WHERE project_id = ?1 AND ({})
             ORDER BY importance DESC
             LIMIT {}",
            ENTITY_COLUMNS,
            clauses.join(" OR "),
            k
        );
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let refs: Vec<&dyn rusqlite::types::ToSql> = args.iter().map(|b| b.as_ref()).collect();
            let rows = stmt.query_map(refs.as_slice(), row_to_entity)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    // ========================================================================
    // RELATIONS
    // ========================================================================

    /// Create a directed relation; duplicate (from, to, type) is rejected
    pub fn relation_insert(
        &self,
        project_id: &str,
        from_entity_id: &str,
        to_entity_id: &str,
        relation_type: RelationType,
        properties: std::collections::HashMap<String, serde_json::Value>,
    ) -> Result<Relation> {
        for id in [from_entity_id, to_entity_id] {
            if self.entity_get(id)?.is_none() {
                return Err(EngineError::NotFound(format!("entity {}", id)));
            }
        }
        let relation = Relation {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            from_entity_id: from_entity_id.to_string(),
            to_entity_id: to_entity_id.to_string(),
            relation_type,
            properties,
            created_at: Utc::now(),
        };
        let props = serde_json::to_string(&relation.properties).unwrap_or_else(|_| "{}".into());
        self.with_writer(|conn| {
            conn.execute(
                "INSERT INTO entity_relations
                 (id, project_id, from_entity_id, to_entity_id, relation_type, properties, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    relation.id,
                    relation.project_id,
                    relation.from_entity_id,
                    relation.to_entity_id,
                    relation.relation_type.as_str(),
                    props,
                    relation.created_at,
                ],
            )
            .map_err(|e| map_constraint(e, "relation (from, to, type)"))?;
            Ok(())
        })?;
        self.bump_epoch(project_id);
        Ok(relation)
    }

    /// Relations touching an entity in either direction
    pub fn relations_for_entity(&self, entity_id: &str) -> Result<Vec<Relation>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, project_id, from_entity_id, to_entity_id, relation_type, properties, created_at
                 FROM entity_relations
                 WHERE from_entity_id = ?1 OR to_entity_id = ?1",
            )?;
            let rows = stmt.query_map(params![entity_id], row_to_relation)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    /// Entities reachable from the seed set within one hop, excluding the
    /// seeds themselves. Powers tier-2 graph expansion.
    pub fn entity_neighbors(&self, entity_ids: &[String]) -> Result<Vec<Entity>> {
        let seeds: HashSet<&str> = entity_ids.iter().map(String::as_str).collect();
        let mut neighbor_ids: Vec<String> = Vec::new();
        for id in entity_ids {
            for relation in self.relations_for_entity(id)? {
                for candidate in [relation.from_entity_id, relation.to_entity_id] {
                    if !seeds.contains(candidate.as_str()) && !neighbor_ids.contains(&candidate) {
                        neighbor_ids.push(candidate);
                    }
                }
            }
        }
        let mut out = Vec::with_capacity(neighbor_ids.len());
        for id in neighbor_ids {
            if let Some(entity) = self.entity_get(&id)? {
                out.push(entity);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_util::test_store;

    fn entity(store: &Store, project: &str, name: &str) -> Entity {
        store
            .entity_upsert(
                project,
                &EntityInput {
                    name: name.into(),
                    entity_type: EntityType::Component,
                    observations: vec![format!("{} exists", name)],
                    importance: 0.5,
                },
            )
            .unwrap()
    }

    #[test]
    fn upsert_merges_observations() {
        let (store, _dir) = test_store();
        let project = store.project_upsert("p", None).unwrap();
        let first = entity(&store, &project.id, "auth-service");

        let merged = store
            .entity_upsert(
                &project.id,
                &EntityInput {
                    name: "auth-service".into(),
                    entity_type: EntityType::Component,
                    observations: vec!["handles token refresh".into()],
                    importance: 0.8,
                },
            )
            .unwrap();
        assert_eq!(merged.id, first.id);
        assert_eq!(merged.observations.len(), 2);
        assert!((merged.importance - 0.8).abs() < 1e-9);
    }

    #[test]
    fn duplicate_relations_are_rejected() {
        let (store, _dir) = test_store();
        let project = store.project_upsert("p", None).unwrap();
        let a = entity(&store, &project.id, "a");
        let b = entity(&store, &project.id, "b");

        store
            .relation_insert(&project.id, &a.id, &b.id, RelationType::DependsOn, Default::default())
            .unwrap();
        let err = store
            .relation_insert(&project.id, &a.id, &b.id, RelationType::DependsOn, Default::default())
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Duplicate);

        // Same pair, different type is a distinct edge
        store
            .relation_insert(&project.id, &a.id, &b.id, RelationType::Uses, Default::default())
            .unwrap();
    }

    #[test]
    fn neighbors_expand_one_hop() {
        let (store, _dir) = test_store();
        let project = store.project_upsert("p", None).unwrap();
        let a = entity(&store, &project.id, "a");
        let b = entity(&store, &project.id, "b");
        let c = entity(&store, &project.id, "c");
        store
            .relation_insert(&project.id, &a.id, &b.id, RelationType::Uses, Default::default())
            .unwrap();
        store
            .relation_insert(&project.id, &b.id, &c.id, RelationType::Uses, Default::default())
            .unwrap();

        let neighbors = store.entity_neighbors(&[a.id.clone()]).unwrap();
        let names: Vec<&str> = neighbors.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["b"]);
    }

    #[test]
    fn search_matches_observations() {
        let (store, _dir) = test_store();
        let project = store.project_upsert("p", None).unwrap();
        store
            .entity_upsert(
                &project.id,
                &EntityInput {
                    name: "login-flow".into(),
                    entity_type: EntityType::Component,
                    observations: vec!["verifies session cookies".into()],
                    importance: 0.5,
                },
            )
            .unwrap();

        assert_eq!(store.entity_search(&project.id, "session cookies", 10).unwrap().len(), 1);
        assert_eq!(store.entity_search(&project.id, "login", 10).unwrap().len(), 1);
        assert!(store.entity_search(&project.id, "unrelated", 10).unwrap().is_empty());
    }
}
