use crate::cluster::JobMetadataStore;
use crate::error::{CoordinatorError, Result};
use crate::metadata::DataInterval;

/// Job ranks whose hashes become the lower bound of each of `sets_num`
/// intervals. Ranks past the last job are clamped to it.
pub fn boundary_ranks(job_count: u64, sets_num: usize) -> Result<Vec<u64>> {
    if sets_num == 0 {
        return Err(CoordinatorError::InvalidTopology(
            "cannot partition jobs into zero copy sets".to_string(),
        ));
    }
    if job_count == 0 {
        return Ok(vec![0; sets_num]);
    }

    let offset = job_count.div_ceil(sets_num as u64);
    Ok((0..sets_num as u64)
        .map(|i| (offset * i).min(job_count - 1))
        .collect())
}

/// Split the job-hash keyspace into `sets_num` contiguous ranges.
///
/// Returns one lower bound per copy set. With no assignable jobs every bound
/// is `0` and the store is not consulted.
pub async fn plan_intervals(
    store: &dyn JobMetadataStore,
    job_count: u64,
    sets_num: usize,
) -> Result<Vec<u64>> {
    let ranks = boundary_ranks(job_count, sets_num)?;
    if job_count == 0 {
        return Ok(ranks);
    }

    let mut boundaries = Vec::with_capacity(ranks.len());
    for rank in ranks {
        boundaries.push(store.job_hash_id_by_offset(rank).await?);
    }

    tracing::debug!(job_count, sets_num, ?boundaries, "Planned job intervals");
    Ok(boundaries)
}

/// Interval owned by copy set `index`: up to the next boundary, or open-ended
/// for the last one.
pub fn data_interval(boundaries: &[u64], index: usize) -> DataInterval {
    match boundaries.get(index + 1) {
        Some(end) => DataInterval::Bounded {
            start: boundaries[index],
            end: *end,
        },
        None => DataInterval::Open {
            start: boundaries[index],
        },
    }
}
