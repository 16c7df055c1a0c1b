//! Literal id lists (`L@web1,web2`).

use crate::types::MinionSet;

/// Split a comma separated id list, dropping empty entries.
pub fn parse_id_list(pattern: &str) -> MinionSet {
    pattern
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn list_match(minion_id: &str, ids: &MinionSet) -> bool {
    ids.contains(minion_id)
}

/// Named ids that are not in `registered`.
pub fn missing_ids(ids: &MinionSet, registered: &MinionSet) -> MinionSet {
    ids.difference(registered).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id_list() {
        let ids = parse_id_list("web1,web2,,web1, db1 ");
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec!["db1", "web1", "web2"]);
    }

    #[test]
    fn test_list_match_is_exact() {
        let ids = parse_id_list("web1,web2");
        assert!(list_match("web1", &ids));
        assert!(!list_match("web", &ids));
        assert!(!list_match("web*", &ids));
    }

    #[test]
    fn test_missing_ids() {
        let ids = parse_id_list("web1,ghost");
        let registered = parse_id_list("web1,web2");
        assert_eq!(
            missing_ids(&ids, &registered).into_iter().collect::<Vec<_>>(),
            vec!["ghost"]
        );
    }
}
