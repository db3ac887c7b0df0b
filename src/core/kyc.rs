use crate::core::access;
use crate::core::audit::{self, AuditEvent};
use crate::domain::model::{
    Database, Decision, DocumentStatus, DocumentType, KycDocument, KycStatus,
};
use crate::utils::error::{ChamaError, Result};
use crate::utils::validation;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitDocumentRequest {
    pub document_type: DocumentType,
    pub document_number: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewRequest {
    pub decision: Decision,
    #[serde(default)]
    pub note: String,
}

pub fn submit_document(
    db: &mut Database,
    actor: Uuid,
    request: SubmitDocumentRequest,
    now: DateTime<Utc>,
) -> Result<KycDocument> {
    access::user(db, actor)?;
    let number = request.document_number.trim().to_uppercase();
    validation::validate_non_empty_string("document_number", &number)?;
    let duplicate = db.kyc_documents.values().any(|d| {
        d.user_id == actor
            && d.document_type == request.document_type
            && d.status == DocumentStatus::Pending
    });
    if duplicate {
        return Err(ChamaError::conflict(
            "A document of this type is already awaiting review",
        ));
    }

    let document = KycDocument {
        id: Uuid::new_v4(),
        user_id: actor,
        document_type: request.document_type,
        document_number: number,
        status: DocumentStatus::Pending,
        reviewer_id: None,
        review_note: String::new(),
        submitted_at: now,
        reviewed_at: None,
    };
    db.kyc_documents.insert(document.id, document.clone());
    audit::record(
        db,
        AuditEvent {
            actor: Some(actor),
            action: "submit",
            entity: "kyc_document",
            entity_id: document.id,
            group_id: None,
            detail: format!("type={:?}", document.document_type),
        },
        now,
    );
    Ok(document)
}

/// 一般使用者看自己的文件，員工看全部
pub fn list_documents(
    db: &Database,
    viewer: Uuid,
    status: Option<DocumentStatus>,
) -> Result<Vec<KycDocument>> {
    let is_staff = access::user(db, viewer)?.is_staff;
    let mut docs: Vec<KycDocument> = db
        .kyc_documents
        .values()
        .filter(|d| is_staff || d.user_id == viewer)
        .filter(|d| status.map(|s| d.status == s).unwrap_or(true))
        .cloned()
        .collect();
    docs.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
    Ok(docs)
}

pub fn review_document(
    db: &mut Database,
    actor: Uuid,
    document_id: Uuid,
    request: ReviewRequest,
    now: DateTime<Utc>,
) -> Result<KycDocument> {
    access::require_staff(db, actor)?;
    let mut document = db
        .kyc_documents
        .get(&document_id)
        .cloned()
        .ok_or_else(|| ChamaError::not_found("KycDocument", document_id))?;
    if document.status != DocumentStatus::Pending {
        return Err(ChamaError::invalid_state("This document has already been reviewed"));
    }

    document.status = match request.decision {
        Decision::Approve => DocumentStatus::Approved,
        Decision::Reject => DocumentStatus::Rejected,
    };
    document.reviewer_id = Some(actor);
    document.review_note = request.note.trim().to_string();
    document.reviewed_at = Some(now);
    db.kyc_documents.insert(document.id, document.clone());

    let identity = matches!(
        document.document_type,
        DocumentType::NationalId | DocumentType::Passport
    );
    if document.status == DocumentStatus::Approved && identity {
        if let Some(user) = db.users.get_mut(&document.user_id) {
            user.kyc_status = KycStatus::Verified;
        }
    }
    audit::record(
        db,
        AuditEvent {
            actor: Some(actor),
            action: "review",
            entity: "kyc_document",
            entity_id: document.id,
            group_id: None,
            detail: format!("status={:?}", document.status),
        },
        now,
    );
    Ok(document)
}
