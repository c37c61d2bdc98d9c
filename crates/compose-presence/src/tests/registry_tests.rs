use super::*;

#[test]
fn empty_set_is_done() {
    let set: PendingSet<usize> = PendingSet::new();
    assert!(set.all_done());
    assert!(set.is_empty());
    assert_eq!(set.pending(), 0);
}

#[test]
fn completes_when_every_token_is_done() {
    let mut set = PendingSet::new();
    set.add(1usize);
    set.add(2usize);
    assert!(!set.all_done());

    assert!(set.mark_done(&1));
    assert!(!set.all_done());
    assert_eq!(set.pending(), 1);

    assert!(set.mark_done(&2));
    assert!(set.all_done());
}

#[test]
fn marking_unknown_token_is_ignored() {
    let mut set = PendingSet::new();
    set.add(1usize);
    assert!(!set.mark_done(&7));
    assert!(!set.contains(&7));
    assert!(!set.all_done());
}

#[test]
fn double_mark_matches_single_mark() {
    let mut set = PendingSet::new();
    set.add(1usize);
    set.add(2usize);
    set.mark_done(&1);
    set.mark_done(&1);
    assert_eq!(set.pending(), 1);
    assert!(!set.all_done());
}

#[test]
fn removing_pending_token_unblocks() {
    let mut set = PendingSet::new();
    set.add(1usize);
    set.add(2usize);
    set.mark_done(&1);
    assert!(set.remove(&2));
    assert!(!set.remove(&2));
    assert!(set.all_done());
    assert_eq!(set.len(), 1);
}

#[test]
fn reset_rearms_every_token() {
    let mut set = PendingSet::new();
    set.add("fade");
    set.add("slide");
    set.mark_done(&"fade");
    set.mark_done(&"slide");
    assert!(set.all_done());

    set.reset();
    assert!(!set.all_done());
    assert_eq!(set.pending(), 2);
}

#[test]
fn re_adding_done_token_makes_it_pending() {
    let mut set = PendingSet::new();
    set.add(3usize);
    set.mark_done(&3);
    set.add(3usize);
    assert_eq!(set.len(), 1);
    assert!(!set.all_done());
}

#[test]
fn debug_lists_tokens_in_registration_order() {
    let mut set = PendingSet::new();
    set.add(2usize);
    set.add(1usize);
    set.mark_done(&1);
    assert_eq!(format!("{set:?}"), "{2: false, 1: true}");
}
