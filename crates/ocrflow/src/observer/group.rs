//! Multi-page grouping and derived aggregate state.

use serde::Serialize;

use crate::job::{JobRecord, JobStatus};

/// Pages that share a `group_id`, presented as one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentGroup {
    pub group_id: String,
    /// Ordered by `page_number`.
    pub pages: Vec<JobRecord>,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DocumentGroup {
    pub fn new(group_id: &str, mut pages: Vec<JobRecord>) -> Self {
        pages.sort_by_key(|p| p.page_number.unwrap_or(u32::MAX));
        Self {
            group_id: group_id.to_string(),
            status: aggregate_status(pages.iter().map(|p| p.status)),
            confidence: aggregate_confidence(&pages),
            error: aggregate_error(&pages),
            pages,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ObservedDocument {
    Single { job: JobRecord },
    Group { group: DocumentGroup },
}

impl ObservedDocument {
    pub fn status(&self) -> JobStatus {
        match self {
            ObservedDocument::Single { job } => job.status,
            ObservedDocument::Group { group } => group.status,
        }
    }

    pub fn confidence(&self) -> Option<f64> {
        match self {
            ObservedDocument::Single { job } => job.display_confidence(),
            ObservedDocument::Group { group } => group.confidence,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ObservedDocument::Single { job } => job.error.as_deref(),
            ObservedDocument::Group { group } => group.error.as_deref(),
        }
    }

    /// Job id for a single page, group id for a group.
    pub fn id(&self) -> &str {
        match self {
            ObservedDocument::Single { job } => &job.job_id,
            ObservedDocument::Group { group } => &group.group_id,
        }
    }
}

/// Failed if any page failed, completed only when every page completed,
/// processing if any page is being worked on, otherwise pending.
pub fn aggregate_status(statuses: impl IntoIterator<Item = JobStatus>) -> JobStatus {
    let statuses: Vec<JobStatus> = statuses.into_iter().collect();
    if statuses.is_empty() {
        return JobStatus::Pending;
    }
    if statuses.contains(&JobStatus::Failed) {
        JobStatus::Failed
    } else if statuses.iter().all(|s| *s == JobStatus::Completed) {
        JobStatus::Completed
    } else if statuses.iter().any(|s| s.is_active()) {
        JobStatus::Processing
    } else {
        JobStatus::Pending
    }
}

/// Mean of the page confidences that are present.
pub fn aggregate_confidence(pages: &[JobRecord]) -> Option<f64> {
    let scores: Vec<f64> = pages.iter().filter_map(|p| p.display_confidence()).collect();
    if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    }
}

pub fn aggregate_error(pages: &[JobRecord]) -> Option<String> {
    let errors: Vec<String> = pages
        .iter()
        .enumerate()
        .filter_map(|(i, p)| {
            let page = p.page_number.unwrap_or(i as u32 + 1);
            p.error.as_ref().map(|e| format!("Page {}: {}", page, e))
        })
        .collect();
    if errors.is_empty() {
        None
    } else {
        Some(errors.join("; "))
    }
}

/// Folds jobs into documents. Standalone jobs stay single; jobs sharing a
/// `group_id` become one group placed where its first page appeared.
pub fn group_documents(jobs: &[JobRecord]) -> Vec<ObservedDocument> {
    enum Slot {
        Single(usize),
        Group(String),
    }

    let mut order: Vec<Slot> = Vec::new();
    let mut groups: Vec<(String, Vec<JobRecord>)> = Vec::new();

    for (i, job) in jobs.iter().enumerate() {
        match &job.group_id {
            None => order.push(Slot::Single(i)),
            Some(group_id) => match groups.iter_mut().find(|(id, _)| id == group_id) {
                Some((_, pages)) => pages.push(job.clone()),
                None => {
                    order.push(Slot::Group(group_id.clone()));
                    groups.push((group_id.clone(), vec![job.clone()]));
                }
            },
        }
    }

    order
        .into_iter()
        .filter_map(|slot| match slot {
            Slot::Single(i) => Some(ObservedDocument::Single { job: jobs[i].clone() }),
            Slot::Group(group_id) => groups
                .iter()
                .find(|(id, _)| *id == group_id)
                .map(|(id, pages)| ObservedDocument::Group {
                    group: DocumentGroup::new(id, pages.clone()),
                }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(id: &str, group: &str, page: u32, status: JobStatus) -> JobRecord {
        let mut record = JobRecord::new(id, "t1");
        record.group_id = Some(group.to_string());
        record.page_number = Some(page);
        record.status = status;
        record
    }

    #[test]
    fn test_aggregate_status_derivation() {
        use JobStatus::*;
        assert_eq!(aggregate_status([Completed, Completed, Failed]), Failed);
        assert_eq!(aggregate_status([Completed, Processing]), Processing);
        assert_eq!(aggregate_status([Completed, AiCorrection]), Processing);
        assert_eq!(aggregate_status([Completed, Completed]), Completed);
        assert_eq!(aggregate_status([Completed, Pending]), Pending);
        assert_eq!(aggregate_status([Queued, Pending]), Pending);
        assert_eq!(aggregate_status([Processing, Failed]), Failed);
        assert_eq!(aggregate_status(Vec::new()), Pending);
    }

    #[test]
    fn test_group_orders_pages_and_averages_confidence() {
        let mut p2 = page("b", "g1", 2, JobStatus::Completed);
        p2.combined_confidence = Some(0.8);
        let mut p1 = page("a", "g1", 1, JobStatus::Completed);
        p1.combined_confidence = Some(0.6);
        let p3 = page("c", "g1", 3, JobStatus::Completed);

        let group = DocumentGroup::new("g1", vec![p2, p3, p1]);
        let ids: Vec<&str> = group.pages.iter().map(|p| p.job_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(group.status, JobStatus::Completed);
        assert!((group.confidence.unwrap() - 0.7).abs() < 1e-9);
        assert!(group.error.is_none());
    }

    #[test]
    fn test_group_error_names_pages() {
        let mut p1 = page("a", "g1", 1, JobStatus::Failed);
        p1.error = Some("timeout".to_string());
        let mut p3 = page("c", "g1", 3, JobStatus::Failed);
        p3.error = Some("bad image".to_string());
        let p2 = page("b", "g1", 2, JobStatus::Completed);

        let group = DocumentGroup::new("g1", vec![p3, p2, p1]);
        assert_eq!(group.status, JobStatus::Failed);
        assert_eq!(group.error.as_deref(), Some("Page 1: timeout; Page 3: bad image"));
    }

    #[test]
    fn test_group_documents_keeps_first_appearance_order() {
        let single = JobRecord::new("s1", "t3");
        let jobs = vec![
            page("g1-p2", "g1", 2, JobStatus::Processing),
            single.clone(),
            page("g1-p1", "g1", 1, JobStatus::Completed),
            page("g2-p1", "g2", 1, JobStatus::Pending),
        ];

        let documents = group_documents(&jobs);
        assert_eq!(documents.len(), 3);
        assert_eq!(documents[0].id(), "g1");
        assert_eq!(documents[0].status(), JobStatus::Processing);
        assert_eq!(documents[1], ObservedDocument::Single { job: single });
        assert_eq!(documents[2].id(), "g2");

        let ObservedDocument::Group { group } = &documents[0] else {
            panic!("expected a group");
        };
        assert_eq!(group.page_count(), 2);
        assert_eq!(group.pages[0].job_id, "g1-p1");
    }

    #[test]
    fn test_single_document_serializes_with_kind() {
        let doc = ObservedDocument::Single {
            job: JobRecord::new("j1", "t1"),
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["kind"], "single");
        assert_eq!(json["job"]["jobId"], "j1");
    }
}
