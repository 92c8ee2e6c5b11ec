//! Page dispatch engine: weighted round-robin over per-cycle page quotas.
//!
//! Every operation takes a borrowed snapshot and returns a new owned
//! `Campaign`, so the record loaded from the store is never aliased by the
//! record written back.

use crate::types::{Campaign, Page};
use std::collections::BTreeMap;
use url::form_urlencoded;

/// Aggregate `cycle_hits_done` a campaign must reach before its cycle is
/// reclaimed.
pub const CYCLE_RESET_THRESHOLD: u64 = 100;

/// Query parameter carrying the dispatched page id to the landing page.
pub const INTOID_PARAM: &str = "intoid";

/// Outcome of a successful dispatch: the page to redirect to and the
/// campaign state to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub page: Page,
    pub campaign: Campaign,
    /// Whether a cycle reset was needed to find the page.
    pub cycle_reset: bool,
}

/// Result of running the dispatch protocol. Both variants carry a campaign
/// that must be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Dispatched(Dispatch),
    /// The reset attempt still left no eligible page. `campaign` holds the
    /// post-reset state, including the `cycles_done` increment.
    NoDestination { campaign: Campaign },
}

impl DispatchOutcome {
    /// Campaign state to write back.
    pub fn campaign(&self) -> &Campaign {
        match self {
            DispatchOutcome::Dispatched(d) => &d.campaign,
            DispatchOutcome::NoDestination { campaign } => campaign,
        }
    }

    pub fn dispatched(self) -> Option<Dispatch> {
        match self {
            DispatchOutcome::Dispatched(d) => Some(d),
            DispatchOutcome::NoDestination { .. } => None,
        }
    }
}

/// Return the last page in sequence order that still has quota.
pub fn select_page(campaign: &Campaign) -> Option<&Page> {
    campaign.pages.iter().rev().find(|p| p.is_eligible())
}

/// Reclaim the cycle when the campaign has served enough hits in total.
///
/// Counters are only zeroed when the sum over all pages reaches
/// [`CYCLE_RESET_THRESHOLD`]; `cycles_done` is incremented either way.
pub fn reset_cycle(campaign: &Campaign) -> Campaign {
    let mut next = campaign.clone();
    let total: u64 = next.pages.iter().map(|p| u64::from(p.cycle_hits_done)).sum();

    if total >= CYCLE_RESET_THRESHOLD {
        for page in &mut next.pages {
            page.cycle_hits_done = 0;
        }
    }

    next.cycles_done = next.cycles_done.saturating_add(1);
    next
}

/// Count one dispatch against `page_id`. Unknown ids leave the campaign as is.
pub fn record_dispatch(campaign: &Campaign, page_id: i64) -> Campaign {
    let mut next = campaign.clone();
    if let Some(page) = next.pages.iter_mut().find(|p| p.id == page_id) {
        page.cycle_hits_done = page.cycle_hits_done.saturating_add(1);
    }
    next
}

/// Run the full dispatch protocol on a loaded snapshot.
///
/// At most one cycle reset is attempted. `NoDestination` means the caller
/// must not redirect, but the reset campaign is still to be saved.
pub fn dispatch(campaign: &Campaign) -> DispatchOutcome {
    if let Some(page) = select_page(campaign) {
        let updated = record_dispatch(campaign, page.id);
        return DispatchOutcome::Dispatched(Dispatch {
            page: page.clone(),
            campaign: updated,
            cycle_reset: false,
        });
    }

    let reset = reset_cycle(campaign);
    let Some(page) = select_page(&reset).cloned() else {
        return DispatchOutcome::NoDestination { campaign: reset };
    };
    let updated = record_dispatch(&reset, page.id);

    DispatchOutcome::Dispatched(Dispatch {
        page,
        campaign: updated,
        cycle_reset: true,
    })
}

/// Build the redirect target for `page`, forwarding the incoming query.
///
/// `intoid=<page id>` always comes first, followed by the incoming pairs
/// encoded with sorted keys. A fragment on the destination is moved after
/// the merged query.
pub fn build_redirect_url<K, V>(page: &Page, incoming: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let (base, fragment) = match page.url.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (page.url.as_str(), None),
    };

    let separator = match base.split_once('?') {
        None => "?",
        Some((_, query)) if query.is_empty() || query.ends_with('&') => "",
        Some(_) => "&",
    };

    let mut url = format!("{base}{separator}{INTOID_PARAM}={}", page.id);

    if !incoming.is_empty() {
        url.push('&');
        url.push_str(&encode_query(incoming));
    }

    if let Some(fragment) = fragment {
        url.push('#');
        url.push_str(fragment);
    }

    url
}

/// Form-encode pairs sorted by key; repeated keys keep their value order.
fn encode_query<K, V>(pairs: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (key, value) in pairs {
        grouped.entry(key.as_ref()).or_default().push(value.as_ref());
    }

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, values) in grouped {
        for value in values {
            serializer.append_pair(key, value);
        }
    }
    serializer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(id: i64, done: u32, todo: u32) -> Page {
        Page {
            id,
            name: format!("page-{id}"),
            url: format!("https://dest.test/{id}"),
            cycle_hits_done: done,
            cycle_hits_todo: todo,
        }
    }

    fn campaign(pages: Vec<Page>) -> Campaign {
        Campaign {
            id: 1,
            name: "Test".to_string(),
            key: "test".to_string(),
            params: String::new(),
            cycles_done: 0,
            pages,
        }
    }

    const NO_QUERY: &[(&str, &str)] = &[];

    #[test]
    fn test_select_last_eligible_page() {
        let c = campaign(vec![page(1, 0, 10), page(2, 10, 10), page(3, 2, 10)]);
        assert_eq!(select_page(&c).map(|p| p.id), Some(3));
    }

    #[test]
    fn test_select_none_when_all_at_quota() {
        let c = campaign(vec![page(1, 10, 10), page(2, 5, 5)]);
        assert!(select_page(&c).is_none());
        assert!(select_page(&campaign(vec![])).is_none());
    }

    #[test]
    fn test_record_dispatch_increments_one_page() {
        let c = campaign(vec![page(1, 0, 10), page(2, 3, 10), page(3, 2, 10)]);
        let selected = select_page(&c).unwrap().id;
        let next = record_dispatch(&c, selected);

        for (before, after) in c.pages.iter().zip(next.pages.iter()) {
            if before.id == selected {
                assert_eq!(after.cycle_hits_done, before.cycle_hits_done + 1);
            } else {
                assert_eq!(after.cycle_hits_done, before.cycle_hits_done);
            }
        }
        // Input snapshot untouched.
        assert_eq!(c.pages[2].cycle_hits_done, 2);
    }

    #[test]
    fn test_record_dispatch_unknown_page_is_noop() {
        let c = campaign(vec![page(1, 0, 10)]);
        assert_eq!(record_dispatch(&c, 99), c);
    }

    #[test]
    fn test_reset_below_threshold_keeps_counters() {
        let c = campaign(vec![page(1, 40, 40), page(2, 59, 59)]);
        let next = reset_cycle(&c);
        assert_eq!(next.pages, c.pages);
        assert_eq!(next.cycles_done, 1);
    }

    #[test]
    fn test_reset_at_threshold_zeroes_counters() {
        let c = campaign(vec![page(1, 50, 50), page(2, 50, 50)]);
        let next = reset_cycle(&c);
        assert!(next.pages.iter().all(|p| p.cycle_hits_done == 0));
        assert_eq!(next.cycles_done, 1);
    }

    #[test]
    fn test_dispatch_direct_hit() {
        let c = campaign(vec![page(1, 0, 10), page(2, 0, 10)]);
        let d = dispatch(&c).dispatched().unwrap();
        assert_eq!(d.page.id, 2);
        assert!(!d.cycle_reset);
        assert_eq!(d.campaign.pages[1].cycle_hits_done, 1);
        assert_eq!(d.campaign.cycles_done, 0);
    }

    #[test]
    fn test_dispatch_resets_exhausted_cycle() {
        let c = campaign(vec![page(1, 70, 70), page(2, 30, 30)]);
        let d = dispatch(&c).dispatched().unwrap();
        assert!(d.cycle_reset);
        assert_eq!(d.page.id, 2);
        assert_eq!(d.campaign.cycles_done, 1);
        assert_eq!(d.campaign.pages[0].cycle_hits_done, 0);
        assert_eq!(d.campaign.pages[1].cycle_hits_done, 1);
    }

    #[test]
    fn test_dispatch_unavailable_below_threshold() {
        // A zero-quota page keeps the aggregate under the reset threshold.
        let c = campaign(vec![page(1, 10, 10), page(2, 0, 0)]);
        match dispatch(&c) {
            DispatchOutcome::NoDestination { campaign } => {
                assert_eq!(campaign.cycles_done, 1);
                assert_eq!(campaign.pages, c.pages);
            }
            other => panic!("expected no destination, got {other:?}"),
        }

        let empty = dispatch(&campaign(vec![]));
        assert!(empty.clone().dispatched().is_none());
        assert_eq!(empty.campaign().cycles_done, 1);
    }

    #[test]
    fn test_redirect_url_plain_destination() {
        let p = page(5, 0, 1);
        assert_eq!(build_redirect_url(&p, NO_QUERY), "https://dest.test/5?intoid=5");
    }

    #[test]
    fn test_redirect_url_keeps_fragment_after_query() {
        let mut p = page(5, 0, 1);
        p.url = "https://x.test/a#sect".to_string();
        assert_eq!(
            build_redirect_url(&p, &[("utm", "x")]),
            "https://x.test/a?intoid=5&utm=x#sect"
        );
    }

    #[test]
    fn test_redirect_url_existing_query() {
        let mut p = page(8, 0, 1);
        p.url = "https://x.test/a?lang=fr#top".to_string();
        assert_eq!(
            build_redirect_url(&p, &[("utm", "b c"), ("aff", "1")]),
            "https://x.test/a?lang=fr&intoid=8&aff=1&utm=b+c#top"
        );
        assert_eq!(build_redirect_url(&p, NO_QUERY), "https://x.test/a?lang=fr&intoid=8#top");
    }

    #[test]
    fn test_redirect_url_trailing_question_mark() {
        let mut p = page(2, 0, 1);
        p.url = "https://x.test/a?".to_string();
        assert_eq!(build_redirect_url(&p, NO_QUERY), "https://x.test/a?intoid=2");
    }

    #[test]
    fn test_redirect_url_repeated_keys_keep_order() {
        let p = page(3, 0, 1);
        assert_eq!(
            build_redirect_url(&p, &[("t", "2"), ("a", "z"), ("t", "1")]),
            "https://dest.test/3?intoid=3&a=z&t=2&t=1"
        );
    }
}
