use dataset_drivers::*;

#[test]
fn repartition_deals_round_robin() -> anyhow::Result<()> {
    let p = Pipeline::default();
    let parts = from_vec(&p, (0..10u32).collect::<Vec<_>>())
        .repartition(3)
        .collect_partitions(&Runner::sequential())?;
    assert_eq!(parts, vec![vec![0, 3, 6, 9], vec![1, 4, 7], vec![2, 5, 8]]);
    Ok(())
}

#[test]
fn parallel_and_sequential_agree() -> anyhow::Result<()> {
    let data: Vec<u64> = (0..1000).collect();
    let build = |p: &Pipeline| {
        from_vec(p, data.clone())
            .filter(|x: &u64| x % 3 != 0)
            .map(|x: &u64| x * 2)
    };
    let seq = build(&Pipeline::default()).collect_seq()?;
    let par = build(&Pipeline::default()).collect_par(Some(4), Some(9))?;
    assert_eq!(seq, par);
    assert_eq!(seq.len(), 666);
    Ok(())
}

#[test]
fn for_each_partition_sees_every_index_once() -> anyhow::Result<()> {
    use std::sync::Mutex;
    let p = Pipeline::default();
    let seen = Mutex::new(Vec::new());
    from_vec(&p, (0..5u8).collect::<Vec<_>>())
        .repartition(8)
        .for_each_partition(&Runner::parallel(Some(3), None), |i, part| {
            seen.lock().unwrap().push((i, part.len()));
            Ok(())
        })?;
    let mut seen = seen.into_inner().unwrap();
    seen.sort_unstable();
    let lens: Vec<usize> = seen.iter().map(|(_, n)| *n).collect();
    assert_eq!(seen.iter().map(|(i, _)| *i).collect::<Vec<_>>(), (0..8).collect::<Vec<_>>());
    assert_eq!(lens, vec![1, 1, 1, 1, 1, 0, 0, 0]);
    Ok(())
}

#[test]
fn first_partition_error_is_returned() {
    let p = Pipeline::default();
    let err = from_vec(&p, (0..4u8).collect::<Vec<_>>())
        .repartition(4)
        .for_each_partition(&Runner::sequential(), |i, _| {
            if i == 2 { Err(anyhow::anyhow!("partition {i} failed")) } else { Ok(()) }
        })
        .unwrap_err();
    assert_eq!(err.to_string(), "partition 2 failed");
}

#[test]
fn try_filter_map_drops_and_fails() -> anyhow::Result<()> {
    let p = Pipeline::default();
    let kept = from_vec(&p, vec![1i32, -2, 3])
        .try_filter_map(|x: i32| Ok((x > 0).then_some(x * 10)))
        .collect_seq()?;
    assert_eq!(kept, vec![10, 30]);

    let p = Pipeline::default();
    let failed = from_vec(&p, vec![1i32, 2])
        .try_filter_map(|x: i32| if x == 2 { anyhow::bail!("two") } else { Ok(Some(x)) })
        .collect_par(None, Some(2));
    assert!(failed.is_err());
    Ok(())
}
