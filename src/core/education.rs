use crate::core::access;
use crate::core::audit::{self, AuditEvent};
use crate::domain::model::{Database, LessonCompletion};
use crate::utils::error::{ChamaError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct Lesson {
    pub slug: &'static str,
    pub title: &'static str,
    pub category: &'static str,
    pub minutes: u32,
    pub body: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub percent: u32,
    pub completed_slugs: Vec<String>,
}

pub static LESSONS: &[Lesson] = &[
    Lesson {
        slug: "what-is-a-chama",
        title: "What is a chama?",
        category: "basics",
        minutes: 5,
        body: "A chama is a member-run group that pools regular contributions to save, lend and invest together.",
    },
    Lesson {
        slug: "roles-of-officials",
        title: "Roles of group officials",
        category: "basics",
        minutes: 6,
        body: "The chairperson leads meetings, the treasurer manages funds and disbursements, and the secretary keeps records.",
    },
    Lesson {
        slug: "budgeting-101",
        title: "Budgeting 101",
        category: "savings",
        minutes: 8,
        body: "Set aside your contribution first, then plan needs before wants. Track spending weekly.",
    },
    Lesson {
        slug: "emergency-fund",
        title: "Building an emergency fund",
        category: "savings",
        minutes: 7,
        body: "Aim for three months of expenses in an accessible account before taking on new debt.",
    },
    Lesson {
        slug: "understanding-interest",
        title: "Understanding loan interest",
        category: "credit",
        minutes: 8,
        body: "Flat interest is charged on the original principal for the whole term. Compare the total due, not just the rate.",
    },
    Lesson {
        slug: "credit-score-basics",
        title: "How your credit score works",
        category: "credit",
        minutes: 6,
        body: "Regular contributions, on-time repayments and verified identity raise your score; late payments and defaults lower it.",
    },
    Lesson {
        slug: "money-market-funds",
        title: "Money market funds",
        category: "investing",
        minutes: 9,
        body: "Money market funds hold short-term debt and offer daily liquidity with modest returns.",
    },
    Lesson {
        slug: "treasury-bills-and-bonds",
        title: "Treasury bills and bonds",
        category: "investing",
        minutes: 10,
        body: "Government securities pay a fixed return over a set term and are among the safest group investments.",
    },
];

pub fn list_lessons(category: Option<&str>) -> Vec<&'static Lesson> {
    LESSONS
        .iter()
        .filter(|l| category.map(|c| l.category.eq_ignore_ascii_case(c)).unwrap_or(true))
        .collect()
}

pub fn get_lesson(slug: &str) -> Result<&'static Lesson> {
    LESSONS
        .iter()
        .find(|l| l.slug == slug)
        .ok_or_else(|| ChamaError::validation("slug", format!("Unknown lesson '{}'", slug)))
}

/// 重複完成不會新增紀錄
pub fn complete_lesson(
    db: &mut Database,
    user_id: Uuid,
    slug: &str,
    now: DateTime<Utc>,
) -> Result<Progress> {
    access::user(db, user_id)?;
    let lesson = get_lesson(slug)?;
    let done = db
        .lesson_completions
        .iter()
        .any(|c| c.user_id == user_id && c.slug == lesson.slug);
    if !done {
        db.lesson_completions.push(LessonCompletion {
            user_id,
            slug: lesson.slug.to_string(),
            completed_at: now,
        });
        audit::record(
            db,
            AuditEvent {
                actor: Some(user_id),
                action: "complete",
                entity: "lesson",
                entity_id: user_id,
                group_id: None,
                detail: format!("slug={}", lesson.slug),
            },
            now,
        );
    }
    Ok(progress(db, user_id))
}

pub fn completed_count(db: &Database, user_id: Uuid) -> usize {
    db.lesson_completions
        .iter()
        .filter(|c| c.user_id == user_id)
        .count()
}

pub fn progress(db: &Database, user_id: Uuid) -> Progress {
    let completed_slugs: Vec<String> = db
        .lesson_completions
        .iter()
        .filter(|c| c.user_id == user_id)
        .map(|c| c.slug.clone())
        .collect();
    let total = LESSONS.len();
    Progress {
        completed: completed_slugs.len(),
        total,
        percent: (completed_slugs.len() * 100 / total.max(1)) as u32,
        completed_slugs,
    }
}
