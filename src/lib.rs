/*!
# Registration Desk

A multilingual (Arabic / French) event-registration service with an admin review
dashboard, built in Rust.

## Overview

Registrants submit their contact details, pick one of four categories and attach
one or more files. Attachments are optionally archived to a cloud drive (OneDrive
through Microsoft Graph, or Google Drive) and the registration record is stored
either in a key-value blob store or in a single list document. Administrators
review the submissions, confirm or reject them, edit or delete them and export
the whole list to a styled Excel workbook.

## Architecture

### HTTP Layer
- **Technologies**: axum, tower-http
- **Endpoints**:
  - `POST /api/submit` - JSON submission with base64 attachments
  - `POST /api/register` - multipart form submission
  - `GET /api/registrations` - list, with optional sort / filter query
  - `POST /api/update`, `POST /api/delete` - admin edits and deletions
  - `POST /api/registrations/:id/status` - confirm / reject
  - `GET /api/export.xlsx`, `GET /api/export.csv` - spreadsheet export
  - `POST /admin/login`, `POST /admin/logout` - admin session

### Core
- Registration Form - field presence validation and record construction
- Submission Pipeline - upload, build, persist
- Cloud Storage Adapter - one trait, configuration-selected implementations
- Admin Dashboard - sorting, filtering, status changes, edits, deletes

### Data Persistence Layer
- Blob store: one JSON document per registration id
- List store: the whole registration list in one JSON document

## Modules

- **registration**: Registration record, categories, statuses, form validation
- **i18n**: Arabic / French strings emitted by the service
- **store**: Repository trait with blob and list implementations
- **dashboard**: Sort, filter and admin mutations
- **config**: Environment-driven configuration
- **error**: Application error type
- **cloud**: OneDrive / Google Drive upload adapters (web feature)
- **pipeline**: Submission orchestration (web feature)
- **export**: XLSX and CSV export (web feature)
- **notify**: Status-change emails (web feature)
- **auth**: Admin password gate and sessions (web feature)
- **app**: Routing and handlers (web feature)
*/

pub mod config;
pub mod dashboard;
pub mod error;
pub mod i18n;
pub mod registration;
pub mod store;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod auth;
#[cfg(feature = "web")]
pub mod cloud;
#[cfg(feature = "web")]
pub mod export;
#[cfg(feature = "web")]
pub mod notify;
#[cfg(feature = "web")]
pub mod pipeline;

/// Re-export the types most callers need
pub use error::{AppError, AppResult};
pub use i18n::Language;
pub use registration::{Attachment, Category, Registration, RegistrationForm, RegistrationStatus};
