use sequencing_core::{
    build_boundaries, classify_producer, classify_slot, enrich_slot, resolve_tick, Classification,
    Entry, LandedBundle, LookupOutcome, SlotInput, SlotMetadata, SourcedEntry, Transaction,
};

const LEADER: &str = "7Np41oeYqPefeNQEHSv1UDhYrehxin3NStELsSKCT4K2";

/// A slot with `ticks` tick entries and one transaction entry of `txs_per_entry`
/// transactions after each tick from `first_busy_tick` onwards.
fn synthetic_slot(slot: u64, ticks: u64, first_busy_tick: u64, txs_per_entry: u64) -> SlotInput {
    let mut entries = Vec::new();
    let mut index = 0u64;
    for tick in 0..ticks {
        entries.push(SourcedEntry::new("primary", Entry::new(index, 0).with_time(index as i64)));
        index += 1;
        if tick >= first_busy_tick {
            entries.push(SourcedEntry::new(
                "primary",
                Entry::new(index, txs_per_entry).with_time(index as i64),
            ));
            index += 1;
        }
    }

    let busy = ticks.saturating_sub(first_busy_tick);
    let transactions = (0..busy * txs_per_entry)
        .map(|i| Transaction::new(i, format!("sig-{slot}-{i}")).with_fee(5_000))
        .collect();

    let mut metadata = SlotMetadata::unknown(slot);
    metadata.leader = LEADER.to_string();

    SlotInput {
        metadata,
        entries,
        transactions,
        bundles: Vec::new(),
    }
}

#[test]
fn reference_example_boundaries() {
    let entries: Vec<Entry> = [0u64, 3, 0, 2]
        .iter()
        .enumerate()
        .map(|(i, &c)| Entry::new(i as u64, c))
        .collect();
    let boundaries = build_boundaries(&entries);

    let ticks: Vec<u32> = boundaries.iter().map(|b| b.tick).collect();
    assert_eq!(ticks, vec![0, 0, 1, 1]);
    assert!(boundaries[0].is_empty());
    assert_eq!((boundaries[1].start, boundaries[1].end), (0, 2));
    assert!(boundaries[2].is_empty());
    assert_eq!((boundaries[3].start, boundaries[3].end), (3, 4));

    assert_eq!(resolve_tick(4, &boundaries).tick, 1);
    assert_eq!(resolve_tick(-5, &boundaries).outcome, LookupOutcome::ClampedLow);
    assert_eq!(resolve_tick(1_000, &boundaries).outcome, LookupOutcome::ClampedHigh);
}

#[test]
fn max_tick_is_one_below_tick_entry_count() {
    let input = synthetic_slot(1, 64, 10, 3);
    let slot = enrich_slot(input);
    assert_eq!(slot.totals.tick_entry_count, 64);
    assert_eq!(slot.totals.max_tick as usize, slot.totals.tick_entry_count - 1);
    assert_eq!(slot.totals.index_mismatches, 0);
}

#[test]
fn late_packing_slot_is_second_half_dominant() {
    let late = enrich_slot(synthetic_slot(10, 64, 40, 5));
    assert_eq!(classify_slot(&late).label, Classification::SecondHalfDominant);

    let spread = enrich_slot(synthetic_slot(11, 64, 0, 5));
    let c = classify_slot(&spread);
    assert_eq!(c.label, Classification::Other);
    assert_eq!(c.second_half_tx_count, 32 * 5);
}

#[test]
fn producer_label_from_recent_slots() {
    let slots = vec![
        enrich_slot(synthetic_slot(1, 64, 40, 4)),
        enrich_slot(synthetic_slot(2, 64, 40, 4)),
        enrich_slot(synthetic_slot(3, 64, 0, 4)),
        enrich_slot(synthetic_slot(4, 64, 50, 4)),
        enrich_slot(synthetic_slot(5, 64, 0, 4)),
    ];
    let producer = classify_producer(LEADER, &slots);
    assert_eq!(producer.label, Classification::SecondHalfDominant);
    assert_eq!(producer.valid_slot_count, 5);
    assert_eq!(producer.dominant_slot_count, 3);
}

#[test]
fn bundled_transactions_do_not_vote() {
    let mut input = synthetic_slot(20, 64, 0, 2);
    // bundle every first-half transaction; only second-half regulars remain
    let first_half: Vec<String> = input
        .transactions
        .iter()
        .filter(|t| t.index < 64)
        .map(|t| t.signature.clone())
        .collect();
    input.bundles.push(LandedBundle {
        bundle_id: "b".into(),
        producer_identity: Some(LEADER.into()),
        tip_lamports: 64_000,
        member_signatures: first_half,
    });

    let slot = enrich_slot(input);
    assert_eq!(slot.totals.bundled_count, 64);
    assert_eq!(slot.totals.total_tips_lamports, 64_000);
    assert_eq!(classify_slot(&slot).label, Classification::SecondHalfDominant);
}

#[test]
fn redundant_streams_are_not_mixed() {
    let mut input = synthetic_slot(30, 8, 0, 1);
    let duplicate: Vec<SourcedEntry> = input
        .entries
        .iter()
        .map(|e| SourcedEntry::new("secondary", e.entry.clone().with_time(e.entry.time_ms.unwrap_or(0) + 5)))
        .collect();
    input.entries.extend(duplicate);

    let slot = enrich_slot(input);
    assert_eq!(slot.totals.entry_count, 16);
    assert_eq!(slot.boundaries.last().map(|b| b.end), Some(7));
}
