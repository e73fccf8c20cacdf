use elgg_core::Guid;
use elgg_engine::{CollectionQueryModifier, Entity, ListingOptions};
use elgg_harness::TestSite;
use elgg_storage::{OrderOption, Predicate, QueryOptions};
use serde_json::json;

/// An owner with objects w, x, y, z created oldest first, and a collection
/// holding y then x.
struct Fixture {
    t: TestSite,
    owner: Entity,
    w: Guid,
    x: Guid,
    y: Guid,
    z: Guid,
}

impl Fixture {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let t = TestSite::new()?;
        let owner = t.create_user()?;
        t.login(&owner);
        let x = t.create_object(owner.guid, 100)?.guid;
        let y = t.create_object(owner.guid, 200)?.guid;
        let z = t.create_object(owner.guid, 300)?.guid;
        let w = t.create_object(owner.guid, 400)?.guid;
        let coll = t.site.fetch_collection(Some(&owner), "featured", true)?.ok_or("no collection")?;
        coll.push(&[y.get(), x.get()])?;
        Ok(Self { t, owner, w, x, y, z })
    }

    fn objects_only() -> QueryOptions {
        QueryOptions {
            wheres: vec![Predicate::column_eq_text("e.type", "object")],
            ..QueryOptions::default()
        }
    }

    fn list(&self, options: ListingOptions) -> Result<Vec<Guid>, Box<dyn std::error::Error>> {
        Ok(self.t.site.get_entities(options)?.into_iter().map(|e| e.guid).collect())
    }

    fn listing(&self, modifier: CollectionQueryModifier) -> ListingOptions {
        ListingOptions {
            query: Self::objects_only(),
            ..ListingOptions::default()
        }
        .with_collection(modifier)
    }
}

#[test]
fn plain_listing_uses_default_order() -> Result<(), Box<dyn std::error::Error>> {
    let f = Fixture::new()?;
    let options = ListingOptions {
        query: Fixture::objects_only(),
        ..ListingOptions::default()
    };
    assert_eq!(f.list(options)?, vec![f.w, f.z, f.y, f.x]);
    Ok(())
}

#[test]
fn sticky_model_puts_collection_first() -> Result<(), Box<dyn std::error::Error>> {
    let f = Fixture::new()?;
    let modifier = f.t.site.collections().sticky_modifier(&f.owner, "featured")?;
    assert_eq!(f.list(f.listing(modifier))?, vec![f.y, f.x, f.w, f.z]);
    Ok(())
}

#[test]
fn sticky_model_keeps_caller_order_as_tie_break() -> Result<(), Box<dyn std::error::Error>> {
    let f = Fixture::new()?;
    let modifier = f.t.site.collections().sticky_modifier(&f.owner, "featured")?;
    let mut options = f.listing(modifier);
    options.query.order_by = Some(OrderOption::try_from(&json!("e.time_created ASC"))?);
    assert_eq!(f.list(options)?, vec![f.y, f.x, f.z, f.w]);
    Ok(())
}

#[test]
fn filter_excludes_members() -> Result<(), Box<dyn std::error::Error>> {
    let f = Fixture::new()?;
    let modifier = f.t.site.collections().filter_modifier(&f.owner, "featured")?;
    assert_eq!(f.list(f.listing(modifier))?, vec![f.w, f.z]);
    Ok(())
}

#[test]
fn selector_returns_members_in_collection_order() -> Result<(), Box<dyn std::error::Error>> {
    let f = Fixture::new()?;
    let modifier = f.t.site.collections().selector_modifier(&f.owner, "featured")?;
    assert_eq!(f.list(f.listing(modifier.clone()))?, vec![f.y, f.x]);

    let mut reversed = modifier;
    reversed.is_reversed = true;
    assert_eq!(f.list(f.listing(reversed))?, vec![f.x, f.y]);
    Ok(())
}

#[test]
fn collection_last_puts_others_first() -> Result<(), Box<dyn std::error::Error>> {
    let f = Fixture::new()?;
    let mut modifier = f.t.site.collections().sticky_modifier(&f.owner, "featured")?;
    modifier.collection_items_first = false;
    assert_eq!(f.list(f.listing(modifier))?, vec![f.w, f.z, f.y, f.x]);
    Ok(())
}

#[test]
fn missing_collection_selects_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let f = Fixture::new()?;
    let modifier = f.t.site.collections().selector_modifier(&f.owner, "missing")?;
    assert!(modifier.collection().is_none());
    assert!(f.list(f.listing(modifier))?.is_empty());
    Ok(())
}

#[test]
fn contradictory_modifier_matches_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let f = Fixture::new()?;
    let mut modifier = f.t.site.collections().sticky_modifier(&f.owner, "featured")?;
    modifier.include_collection = false;
    modifier.include_others = false;
    assert!(f.list(f.listing(modifier))?.is_empty());
    Ok(())
}

#[test]
fn two_modifiers_combine() -> Result<(), Box<dyn std::error::Error>> {
    let f = Fixture::new()?;
    let hidden = f.t.site.fetch_collection(Some(&f.owner), "hidden", true)?.ok_or("no collection")?;
    hidden.push(&[f.w.get()])?;

    let sticky = f.t.site.collections().sticky_modifier(&f.owner, "featured")?;
    let filter = f.t.site.collections().filter_modifier(&f.owner, "hidden")?;
    let options = f.listing(sticky).with_collection(filter);
    assert_eq!(f.list(options)?, vec![f.y, f.x, f.z]);
    Ok(())
}

#[test]
fn json_order_lists_are_accepted() -> Result<(), Box<dyn std::error::Error>> {
    let f = Fixture::new()?;
    let mut options = ListingOptions {
        query: Fixture::objects_only(),
        ..ListingOptions::default()
    };
    options.query.order_by = Some(OrderOption::try_from(&json!([
        { "expression": "e.time_created", "direction": "ASC" },
        "e.guid DESC",
    ]))?);
    options.query.limit = Some(2);
    assert_eq!(f.list(options)?, vec![f.x, f.y]);

    assert!(OrderOption::try_from(&json!(42)).is_err());
    // Structured items take the direction token verbatim.
    assert!(OrderOption::try_from(&json!([{ "expression": "e.guid", "direction": "asc" }])).is_err());
    Ok(())
}
