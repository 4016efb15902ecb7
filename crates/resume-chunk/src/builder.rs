//! Candidate to chunk conversion.

use tracing::debug;

use resume_core::{Candidate, Chunk, ChunkKind, PositionRecord, SchoolRecord};

use crate::dates::{format_date, format_end_date};

/// Builds the chunk sequence for a candidate dataset.
///
/// Pure and deterministic: identical input yields an identical chunk
/// sequence.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkBuilder;

impl ChunkBuilder {
    /// Create a new chunk builder.
    pub fn new() -> Self {
        Self
    }

    /// Build chunks for every candidate, in source order.
    pub fn build(&self, candidates: &[Candidate]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for candidate in candidates {
            chunks.extend(self.build_candidate(candidate));
        }
        debug!(
            "Built {} chunks from {} candidates",
            chunks.len(),
            candidates.len()
        );
        chunks
    }

    /// Build the summary, position and education chunks of one candidate.
    pub fn build_candidate(&self, candidate: &Candidate) -> Vec<Chunk> {
        let resume = &candidate.parsed_resume;
        let mut chunks = Vec::with_capacity(1 + resume.positions.len() + resume.schools.len());

        chunks.push(self.summary_chunk(candidate));

        for (i, position) in resume.positions.iter().enumerate() {
            chunks.push(self.position_chunk(candidate, i as u32, position));
        }

        for (i, school) in resume.schools.iter().enumerate() {
            chunks.push(self.education_chunk(candidate, i as u32, school));
        }

        chunks
    }

    fn summary_chunk(&self, candidate: &Candidate) -> Chunk {
        let content = if candidate.location.is_empty() {
            String::new()
        } else {
            format!("Location: {}", candidate.location)
        };

        Chunk {
            candidate_id: candidate.candidate_id.clone(),
            name: candidate.name.clone(),
            email: candidate.email.clone(),
            content,
            kind: ChunkKind::CandidateSummary {
                location: candidate.location.clone(),
                headline: candidate.headline.clone(),
                stage: candidate.stage.clone(),
            },
        }
    }

    fn position_chunk(&self, candidate: &Candidate, index: u32, position: &PositionRecord) -> Chunk {
        let mut chunk = Chunk {
            candidate_id: candidate.candidate_id.clone(),
            name: candidate.name.clone(),
            email: candidate.email.clone(),
            content: String::new(),
            kind: ChunkKind::Position {
                position_index: index,
                company: position.org.clone(),
                title: position.title.clone(),
                start_date: format_date(position.start.as_ref()),
                end_date: format_end_date(position.end.as_ref()),
                location: position.location.clone(),
                summary: position.summary.clone(),
            },
        };
        chunk.content = describe_chunk(&chunk);
        chunk
    }

    fn education_chunk(&self, candidate: &Candidate, index: u32, school: &SchoolRecord) -> Chunk {
        let mut chunk = Chunk {
            candidate_id: candidate.candidate_id.clone(),
            name: candidate.name.clone(),
            email: candidate.email.clone(),
            content: String::new(),
            kind: ChunkKind::Education {
                education_index: index,
                school: school.org.clone(),
                degree: school.degree.clone(),
                field: school.field.clone(),
                start_date: format_date(school.start.as_ref()),
                end_date: format_end_date(school.end.as_ref()),
                summary: school.summary.clone(),
            },
        };
        chunk.content = describe_chunk(&chunk);
        chunk
    }
}

/// Text of a chunk rebuilt from its metadata alone.
///
/// Positions and education render exactly as the builder does. A summary
/// lists whichever of name, headline and location are known, falling back to
/// the candidate id, so it is never empty.
pub fn describe_chunk(chunk: &Chunk) -> String {
    match &chunk.kind {
        ChunkKind::CandidateSummary {
            location, headline, ..
        } => {
            let lines: Vec<String> = [("Name", &chunk.name), ("Headline", headline), ("Location", location)]
                .into_iter()
                .filter(|(_, value)| !value.is_empty())
                .map(|(label, value)| format!("{}: {}", label, value))
                .collect();
            if lines.is_empty() {
                format!("Candidate: {}", chunk.candidate_id)
            } else {
                lines.join("\n")
            }
        }
        ChunkKind::Position {
            company,
            title,
            start_date,
            end_date,
            location,
            summary,
            ..
        } => format!(
            "Company: {}\nTitle: {}\nDuration: {} - {}\nLocation: {}\n\nExperience Details:\n{}",
            company, title, start_date, end_date, location, summary
        ),
        ChunkKind::Education {
            school,
            degree,
            field,
            start_date,
            end_date,
            summary,
            ..
        } => format!(
            "School: {}\nDegree: {}\nField: {}\nDuration: {} - {}\n\nDetails:\n{}",
            school, degree, field, start_date, end_date, summary
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resume_core::{ChunkType, ParsedResume, ResumeDate};

    fn candidate() -> Candidate {
        Candidate {
            candidate_id: "c1".to_string(),
            name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            location: "London".to_string(),
            headline: "Analyst".to_string(),
            stage: "screen".to_string(),
            links: Vec::new(),
            parsed_resume: ParsedResume {
                positions: vec![
                    PositionRecord {
                        org: "Analytical Engines".to_string(),
                        title: "Programmer".to_string(),
                        summary: "Wrote the first algorithm".to_string(),
                        location: "London".to_string(),
                        start: Some(ResumeDate::new(1842, 9)),
                        end: None,
                    },
                    PositionRecord {
                        org: "Analytical Engines".to_string(),
                        title: "Programmer".to_string(),
                        ..Default::default()
                    },
                ],
                schools: vec![SchoolRecord {
                    org: "Home".to_string(),
                    degree: "Tutoring".to_string(),
                    field: "Mathematics".to_string(),
                    start: Some(ResumeDate {
                        year: Some(1830),
                        month: None,
                    }),
                    end: Some(ResumeDate {
                        year: Some(1835),
                        month: None,
                    }),
                    ..Default::default()
                }],
            },
        }
    }

    #[test]
    fn test_chunk_order_and_types() {
        let chunks = ChunkBuilder::new().build(&[candidate()]);
        let types: Vec<_> = chunks.iter().map(|c| c.chunk_type()).collect();
        assert_eq!(
            types,
            vec![
                ChunkType::CandidateSummary,
                ChunkType::Position,
                ChunkType::Position,
                ChunkType::Education
            ]
        );
        assert!(chunks.iter().all(|c| c.candidate_id == "c1"));
    }

    #[test]
    fn test_position_rendering() {
        let chunks = ChunkBuilder::new().build(&[candidate()]);
        assert_eq!(
            chunks[1].content,
            "Company: Analytical Engines\nTitle: Programmer\nDuration: Sep 1842 - Present\n\
             Location: London\n\nExperience Details:\nWrote the first algorithm"
        );
        match &chunks[1].kind {
            ChunkKind::Position {
                position_index,
                start_date,
                end_date,
                ..
            } => {
                assert_eq!(*position_index, 0);
                assert_eq!(start_date, "Sep 1842");
                assert_eq!(end_date, "Present");
            }
            other => panic!("expected position, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_titles_get_distinct_keys() {
        let chunks = ChunkBuilder::new().build(&[candidate()]);
        assert_ne!(chunks[1].key(), chunks[2].key());
        assert_eq!(chunks[2].key().ordinal, 1);
    }

    #[test]
    fn test_education_rendering() {
        let chunks = ChunkBuilder::new().build(&[candidate()]);
        assert_eq!(
            chunks[3].content,
            "School: Home\nDegree: Tutoring\nField: Mathematics\nDuration: 1830 - 1835\n\nDetails:\n"
        );
    }

    #[test]
    fn test_summary_without_location_is_empty() {
        let mut c = candidate();
        c.location.clear();
        c.parsed_resume = ParsedResume::default();
        let chunks = ChunkBuilder::new().build(&[c]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "");
        assert_eq!(describe_chunk(&chunks[0]), "Name: Ada Lovelace\nHeadline: Analyst");

        let mut anonymous = chunks[0].clone();
        anonymous.name.clear();
        anonymous.kind = ChunkKind::CandidateSummary {
            location: String::new(),
            headline: String::new(),
            stage: String::new(),
        };
        assert_eq!(describe_chunk(&anonymous), "Candidate: c1");
    }

    #[test]
    fn test_describe_matches_built_content() {
        let chunks = ChunkBuilder::new().build(&[candidate()]);
        for chunk in &chunks[1..] {
            assert_eq!(describe_chunk(chunk), chunk.content);
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let input = vec![candidate(), candidate()];
        let first = ChunkBuilder::new().build(&input);
        let second = ChunkBuilder::new().build(&input);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}
