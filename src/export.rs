use crate::dto::CandidatePair;
use crate::error::ServiceError;
use csv::Writer;

pub const EXPORT_HEADER: [&str; 6] = ["id_a", "id_b", "cluster", "score", "verdict", "canonical"];

/// Renders reviewed pairs as CSV, ordered by cluster then pair key.
/// Pairs without a verdict are left out.
pub fn verdicts_csv(mut pairs: Vec<CandidatePair>) -> Result<(Vec<u8>, usize), ServiceError> {
    pairs.retain(CandidatePair::is_reviewed);
    pairs.sort_by(|x, y| x.cluster.cmp(&y.cluster).then_with(|| x.key().cmp(&y.key())));

    let mut writer = Writer::from_writer(vec![]);
    writer
        .write_record(EXPORT_HEADER)
        .map_err(ServiceError::internal_server_error)?;
    for pair in &pairs {
        let cluster = pair.cluster.to_string();
        let score = pair.score.to_string();
        let verdict = pair.verdict.map(|v| v.to_string()).unwrap_or_default();
        writer
            .write_record([
                pair.id_a.as_str(),
                pair.id_b.as_str(),
                cluster.as_str(),
                score.as_str(),
                verdict.as_str(),
                pair.canonical.as_deref().unwrap_or(""),
            ])
            .map_err(ServiceError::internal_server_error)?;
    }
    let object = writer
        .into_inner()
        .map_err(ServiceError::internal_server_error)?;
    Ok((object, pairs.len()))
}
