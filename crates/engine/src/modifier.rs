use std::rc::Rc;

use elgg_core::{Guid, OrderBy};
use elgg_storage::{JoinKind, JoinSpec, Operand, OrderOption, Predicate, QueryOptions};

use crate::collection::{COL_ENTITY_GUID, COL_ITEM, COL_KEY, COL_PRIORITY, Collection, TABLE};
use crate::entities::DEFAULT_ORDER;
use crate::error::EngineError;

/// Join aliases `ci1`, `ci2`, ... for one query build.
#[derive(Debug, Default)]
pub struct AliasGenerator {
    counter: usize,
}

impl AliasGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_alias(&mut self) -> String {
        self.counter += 1;
        format!("ci{}", self.counter)
    }

    pub fn reset(&mut self) {
        self.counter = 0;
    }
}

/// Shapes an entity query around a collection: select only its items, put
/// them first, or filter them out.
#[derive(Debug, Clone)]
pub struct CollectionQueryModifier {
    pub include_collection: bool,
    pub include_others: bool,
    pub is_reversed: bool,
    pub collection_items_first: bool,
    collection: Option<Rc<Collection>>,
}

impl CollectionQueryModifier {
    /// Defaults select only the collection's items, in collection order.
    pub fn new(collection: Option<Rc<Collection>>) -> Self {
        Self {
            include_collection: true,
            include_others: false,
            is_reversed: false,
            collection_items_first: true,
            collection,
        }
    }

    pub fn collection(&self) -> Option<&Rc<Collection>> {
        self.collection.as_ref()
    }

    pub fn use_sticky_model(mut self) -> Self {
        self.include_others = true;
        self.include_collection = true;
        self.collection_items_first = true;
        self.is_reversed = false;
        self
    }

    pub fn use_as_filter(mut self) -> Self {
        self.include_others = true;
        self.include_collection = false;
        self
    }

    /// Add this modifier's join, ordering and filters to `options`.
    ///
    /// With neither collection items nor others wanted, the query is made to
    /// match nothing.
    pub fn prepare_options(
        &self,
        options: &mut QueryOptions,
        join_column: &str,
        aliases: &mut AliasGenerator,
    ) -> Result<(), EngineError> {
        if !self.include_collection && !self.include_others {
            options.wheres.push(Predicate::Never);
            return Ok(());
        }

        let alias = aliases.next_alias();
        let (guid, key) = match &self.collection {
            Some(c) => (c.entity_guid(), c.relationship_key().to_string()),
            None => (Guid::NONE, String::new()),
        };

        let empty_order = match &options.order_by {
            None => true,
            Some(OrderOption::Text(text)) => text.trim().is_empty(),
            Some(OrderOption::List(items)) => items.is_empty(),
        };
        if empty_order {
            options.order_by = Some(OrderOption::Text(DEFAULT_ORDER.to_string()));
        }

        options.joins.push(JoinSpec {
            kind: if self.include_others {
                JoinKind::Left
            } else {
                JoinKind::Inner
            },
            table: TABLE.to_string(),
            alias: alias.clone(),
            on: Predicate::And(vec![
                Predicate::eq(
                    Operand::column(join_column),
                    Operand::column(format!("{alias}.{COL_ITEM}")),
                ),
                Predicate::eq(
                    Operand::column(format!("{alias}.{COL_ENTITY_GUID}")),
                    Operand::Int(guid.get()),
                ),
                Predicate::eq(Operand::column(format!("{alias}.{COL_KEY}")), Operand::Text(key)),
            ]),
        });

        if self.include_collection {
            // Rows outside the collection have a NULL priority, which sorts
            // first ascending and last descending. Negating the priority
            // reverses collection order without moving the NULLs.
            let priority = format!("{alias}.{COL_PRIORITY}");
            let expression = if self.collection_items_first != self.is_reversed {
                format!("-{priority}")
            } else {
                priority
            };
            let order = if self.collection_items_first {
                OrderBy::desc(expression)?
            } else {
                OrderBy::asc(expression)?
            };
            options.prepend_order(order, DEFAULT_ORDER)?;
        } else {
            options
                .wheres
                .push(Predicate::IsNull(Operand::column(format!("{alias}.{COL_ITEM}"))));
        }
        Ok(())
    }
}

impl From<Rc<Collection>> for CollectionQueryModifier {
    fn from(collection: Rc<Collection>) -> Self {
        Self::new(Some(collection))
    }
}

/// Entity listing options plus the collection modifiers to fold into them.
#[derive(Debug, Clone, Default)]
pub struct ListingOptions {
    pub query: QueryOptions,
    pub collections: Vec<CollectionQueryModifier>,
}

impl ListingOptions {
    pub fn with_collection(mut self, modifier: impl Into<CollectionQueryModifier>) -> Self {
        self.collections.push(modifier.into());
        self
    }
}

/// Apply and remove every modifier in `options.collections`, in order.
/// Aliases restart at `ci1` for every call so identical listings produce
/// identical SQL.
pub fn apply_to_options(options: &mut ListingOptions, join_column: &str) -> Result<(), EngineError> {
    if options.collections.is_empty() {
        return Ok(());
    }
    let mut aliases = AliasGenerator::new();
    for modifier in std::mem::take(&mut options.collections) {
        modifier.prepare_options(&mut options.query, join_column, &mut aliases)?;
    }
    aliases.reset();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_strings(options: &QueryOptions) -> Vec<String> {
        options
            .order_by
            .as_ref()
            .unwrap()
            .resolve()
            .unwrap()
            .iter()
            .map(|o| o.to_string())
            .collect()
    }

    fn prepared(modifier: &CollectionQueryModifier) -> QueryOptions {
        let mut options = QueryOptions::default();
        let mut aliases = AliasGenerator::new();
        modifier.prepare_options(&mut options, "e.guid", &mut aliases).unwrap();
        options
    }

    #[test]
    fn contradiction_matches_nothing() {
        let mut modifier = CollectionQueryModifier::new(None);
        modifier.include_collection = false;
        modifier.include_others = false;
        let options = prepared(&modifier);
        assert!(options.joins.is_empty());
        assert!(matches!(options.wheres.as_slice(), [Predicate::Never]));
    }

    #[test]
    fn selector_uses_inner_join() {
        let options = prepared(&CollectionQueryModifier::new(None));
        assert_eq!(options.joins.len(), 1);
        assert_eq!(options.joins[0].kind, JoinKind::Inner);
        assert_eq!(options.joins[0].alias, "ci1");
        assert!(options.wheres.is_empty());
    }

    #[test]
    fn filter_uses_anti_join() {
        let options = prepared(&CollectionQueryModifier::new(None).use_as_filter());
        assert_eq!(options.joins[0].kind, JoinKind::Left);
        assert!(matches!(options.wheres.as_slice(), [Predicate::IsNull(_)]));
        assert_eq!(order_strings(&options), vec!["e.time_created DESC", "e.guid DESC"]);
    }

    #[test]
    fn ordering_for_each_flag_combination() {
        let cases = [
            (true, false, "-ci1.id DESC"),
            (true, true, "ci1.id DESC"),
            (false, false, "ci1.id ASC"),
            (false, true, "-ci1.id ASC"),
        ];
        for (first, reversed, expected) in cases {
            let mut modifier = CollectionQueryModifier::new(None).use_sticky_model();
            modifier.collection_items_first = first;
            modifier.is_reversed = reversed;
            let options = prepared(&modifier);
            assert_eq!(
                order_strings(&options),
                vec![expected, "e.time_created DESC", "e.guid DESC"],
                "first={first} reversed={reversed}"
            );
        }
    }

    #[test]
    fn caller_order_becomes_tie_break() {
        let mut listing = ListingOptions::default();
        listing.query.order_by = Some(OrderOption::Text("e.guid ASC".into()));
        listing.collections.push(CollectionQueryModifier::new(None));
        listing.collections.push(CollectionQueryModifier::new(None).use_sticky_model());
        apply_to_options(&mut listing, "e.guid").unwrap();

        assert!(listing.collections.is_empty());
        let aliases: Vec<&str> = listing.query.joins.iter().map(|j| j.alias.as_str()).collect();
        assert_eq!(aliases, vec!["ci1", "ci2"]);
        assert_eq!(
            order_strings(&listing.query),
            vec!["-ci2.id DESC", "-ci1.id DESC", "e.guid ASC"]
        );
    }
}
