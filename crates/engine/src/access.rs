use elgg_core::AccessId;
use elgg_storage::{Operand, Predicate};

use crate::session::Session;

/// Row visibility for the acting user, or `None` when access is ignored.
///
/// A row is visible when it is public, when it is logged-in only and someone
/// is logged in, or when the acting user owns it.
pub fn access_predicate(session: &Session, access_column: &str, owner_column: &str) -> Option<Predicate> {
    if session.ignore_access() {
        return None;
    }
    let mut visible = vec![Predicate::column_eq_int(access_column, AccessId::PUBLIC.get())];
    if session.is_logged_in() {
        let user = session.user_guid();
        visible.push(Predicate::column_eq_int(access_column, AccessId::LOGGED_IN.get()));
        visible.push(Predicate::eq(Operand::column(owner_column), Operand::Int(user.get())));
    }
    Some(Predicate::Or(visible))
}

#[cfg(test)]
mod tests {
    use super::*;
    use elgg_core::{Guid, SqlDialect};
    use elgg_storage::QueryBuilder;

    fn render(session: &Session) -> Option<String> {
        let mut qb = QueryBuilder::new("", SqlDialect::Sqlite);
        access_predicate(session, "md.access_id", "md.owner_guid").map(|p| qb.render_predicate(&p))
    }

    #[test]
    fn anonymous_sees_public_only() {
        let session = Session::new();
        assert_eq!(render(&session).as_deref(), Some("(md.access_id = 2)"));
    }

    #[test]
    fn logged_in_sees_own_rows() {
        let session = Session::new();
        session.login(Guid::from_raw(7));
        assert_eq!(
            render(&session).as_deref(),
            Some("(md.access_id = 2) OR (md.access_id = 1) OR (md.owner_guid = 7)")
        );
        let _guard = session.ignore_access_guard();
        assert!(render(&session).is_none());
    }
}
