//! Observable form session: one record being edited through a wizard.
//!
//! The session owns the live record and is its only writer. Every mutation
//! goes through a method here, re-validates the current step and is
//! announced to subscribers as a `SessionEvent`. Asynchronous work (address
//! lookups, saves, loads) is split into a begin/apply pair so a caller can
//! run several lookups concurrently and still have stale results discarded.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;

use crate::db::RecordStore;
use crate::enrichment::{self, AddressLookup, LookupError, LookupTicket, LookupTracker};
use crate::error::FormError;
use crate::models::{age_in_years, FieldKind, FieldValue, LookupResult, NoticeKind, Record};
use crate::normalize;
use crate::reconcile::Reconciler;
use crate::rules;
use crate::schema::{self, FormSchema, ValidatedRecord, ValidationErrors};
use crate::wizard::{StepTransition, Wizard};

/// Non-blocking message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SessionEvent {
    FieldChanged { field: &'static str },
    FlagChanged {
        flag: &'static str,
        value: bool,
        cleared: Vec<&'static str>,
    },
    AddressMerged { changed: Vec<&'static str> },
    Notice(Notice),
    StepChanged { step: usize },
    Saved { id: String },
    Loaded { id: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Moved { to: usize },
    /// Final step submitted; the record now carries this id.
    Saved { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupApplied {
    Merged { changed: Vec<&'static str> },
    NotFound,
    Failed,
    /// A newer lookup was started; this result was dropped.
    Stale,
    /// Postal code not yet 8 digits; nothing was requested.
    Incomplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileOpened {
    Existing,
    Blank,
}

type Subscriber = Box<dyn FnMut(&SessionEvent)>;

/// Clears the in-flight flag when a save future is dropped before it settles.
struct PendingSave<'a>(&'a mut bool);

impl Drop for PendingSave<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}

pub struct FormSession {
    schema: &'static FormSchema,
    record: Record,
    wizard: Wizard,
    errors: ValidationErrors,
    touched: BTreeSet<&'static str>,
    lookups: LookupTracker,
    saving: bool,
    notices: Vec<Notice>,
    subscribers: Vec<Subscriber>,
}

impl FormSession {
    /// Blank record with the schema's flag defaults, first step.
    pub fn new(schema: &'static FormSchema) -> Self {
        Self {
            schema,
            record: schema.blank_record(),
            wizard: Wizard::new(schema),
            errors: ValidationErrors::default(),
            touched: BTreeSet::new(),
            lookups: LookupTracker::default(),
            saving: false,
            notices: Vec::new(),
            subscribers: Vec::new(),
        }
    }

    /// Session for a signed-in user. Without a user the form cannot open.
    pub fn for_owner(schema: &'static FormSchema, owner: Option<&str>) -> Result<Self, FormError> {
        let owner = owner.ok_or(FormError::Unauthenticated)?;
        let mut session = Self::new(schema);
        session.record.owner = Some(owner.to_string());
        Ok(session)
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&SessionEvent) + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    fn emit(&mut self, event: SessionEvent) {
        for subscriber in self.subscribers.iter_mut() {
            subscriber(&event);
        }
    }

    fn post_notice(&mut self, kind: NoticeKind, message: impl Into<String>) {
        let notice = Notice {
            kind,
            message: message.into(),
        };
        self.notices.push(notice.clone());
        self.emit(SessionEvent::Notice(notice));
    }

    // ─── Accessors ──────────────────────────────────────────────────────────

    pub fn schema(&self) -> &'static FormSchema {
        self.schema
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    /// Errors currently shown: touched fields of the current step, or the
    /// full set from the last blocked advance/submit.
    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn wizard(&self) -> &Wizard {
        &self.wizard
    }

    pub fn current_step(&self) -> usize {
        self.wizard.current()
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Masked text for a bound input.
    pub fn display_value(&self, field: &str) -> String {
        match (self.schema.field(field), self.record.get(field)) {
            (Some(spec), Some(value)) => normalize::format(value, spec.kind),
            _ => String::new(),
        }
    }

    pub fn required_fields(&self) -> BTreeSet<&'static str> {
        rules::required_fields_for(&self.record, self.schema)
    }

    /// Whole years since the birth date, if the schema has one and it parses.
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        let field = self.schema.birth_date_field?;
        let birth = NaiveDate::parse_from_str(self.record.text(field), "%Y-%m-%d").ok()?;
        age_in_years(birth, today)
    }

    // ─── Input ──────────────────────────────────────────────────────────────

    /// Normalize and store raw input for a field.
    pub fn set_input(&mut self, field: &str, raw: &str) -> Result<(), FormError> {
        let schema = self.schema;
        let spec = schema
            .field(field)
            .ok_or_else(|| FormError::UnknownField(field.to_string()))?;

        let value = normalize::normalize(raw, spec.kind);
        if let FieldValue::Flag(flag) = value {
            return self.set_flag(spec.name, flag).map(|_| ());
        }

        // An edited postal code outdates any lookup still in flight.
        if spec.name == schema.address.postal_code
            && self.record.get(spec.name) != Some(&value)
        {
            self.lookups.invalidate();
        }

        self.record.set(spec.name, value);
        self.touched.insert(spec.name);
        self.revalidate();
        self.emit(SessionEvent::FieldChanged { field: spec.name });
        Ok(())
    }

    /// Set a flag field, clearing any group it switches off.
    pub fn set_flag(&mut self, flag: &str, value: bool) -> Result<Vec<&'static str>, FormError> {
        let schema = self.schema;
        let spec = schema
            .field(flag)
            .ok_or_else(|| FormError::UnknownField(flag.to_string()))?;
        if spec.kind != FieldKind::Flag {
            return Err(FormError::NotAFlag(flag.to_string()));
        }

        let cleared = rules::apply_flag_change(&mut self.record, schema, spec.name, value);
        self.touched.insert(spec.name);
        self.revalidate();
        self.emit(SessionEvent::FlagChanged {
            flag: spec.name,
            value,
            cleared: cleared.clone(),
        });
        Ok(cleared)
    }

    /// Recompute live errors for the current step's touched fields.
    pub fn revalidate(&mut self) {
        let step_fields = &self.wizard.current_step().fields;
        let mut errors = match schema::validate_fields(&self.record, self.schema, step_fields) {
            Ok(()) => ValidationErrors::default(),
            Err(errors) => errors,
        };
        errors.retain(|field| self.touched.contains(field));
        self.errors = errors;
    }

    fn block(&mut self, errors: ValidationErrors) -> FormError {
        let schema = self.schema;
        self.touched
            .extend(errors.fields().filter_map(|f| schema.field(f)).map(|spec| spec.name));
        self.errors = errors.clone();
        FormError::Validation(errors)
    }

    // ─── Address enrichment ─────────────────────────────────────────────────

    /// Take a ticket for the current postal code, if it is complete.
    /// Call when the postal-code input loses focus.
    pub fn begin_lookup(&mut self) -> Option<LookupTicket> {
        let code = self.record.text(self.schema.address.postal_code);
        if !normalize::is_complete_postal_code(code) {
            return None;
        }
        let code = code.to_string();
        Some(self.lookups.issue(&code))
    }

    /// Merge a lookup outcome, unless a newer lookup has been started.
    pub fn apply_lookup(
        &mut self,
        ticket: &LookupTicket,
        outcome: Result<LookupResult, LookupError>,
    ) -> LookupApplied {
        if !self.lookups.is_current(ticket) {
            tracing::debug!(generation = ticket.generation, "Discarding stale address lookup");
            return LookupApplied::Stale;
        }

        match outcome {
            Ok(result) => {
                let schema = self.schema;
                let changed = enrichment::merge_address(&mut self.record, &schema.address, &result);
                self.touched.extend(changed.iter().copied());
                self.revalidate();
                self.emit(SessionEvent::AddressMerged {
                    changed: changed.clone(),
                });
                LookupApplied::Merged { changed }
            }
            Err(LookupError::NotFound(_)) => {
                self.post_notice(NoticeKind::AddressNotFound, "CEP not found");
                LookupApplied::NotFound
            }
            Err(err) => {
                tracing::warn!(error = %err, "Address lookup failed");
                self.post_notice(
                    NoticeKind::LookupFailed,
                    format!("Could not look up the address: {err}"),
                );
                LookupApplied::Failed
            }
        }
    }

    /// Begin, run with a bounded wait, and apply a lookup in one go.
    pub async fn lookup_address<L: AddressLookup>(
        &mut self,
        client: &L,
        timeout: Duration,
    ) -> LookupApplied {
        let Some(ticket) = self.begin_lookup() else {
            return LookupApplied::Incomplete;
        };
        let outcome = enrichment::lookup_with_timeout(client, &ticket.postal_code, timeout).await;
        self.apply_lookup(&ticket, outcome)
    }

    // ─── Navigation ─────────────────────────────────────────────────────────

    /// Step forward, or submit from the last step.
    pub async fn advance<S: RecordStore>(
        &mut self,
        reconciler: &Reconciler<S>,
    ) -> Result<AdvanceOutcome, FormError> {
        if self.saving {
            return Err(FormError::SubmitInFlight);
        }

        match self.wizard.advance(&self.record, self.schema) {
            StepTransition::Moved { to, .. } => {
                self.errors = ValidationErrors::default();
                self.emit(SessionEvent::StepChanged { step: to });
                Ok(AdvanceOutcome::Moved { to })
            }
            StepTransition::Blocked(errors) => Err(self.block(errors)),
            StepTransition::Submit(validated) => {
                let id = self.persist(reconciler, validated).await?;
                Ok(AdvanceOutcome::Saved { id })
            }
        }
    }

    /// Step back without validating. `false` on the first step.
    pub fn retreat(&mut self) -> bool {
        if !self.wizard.retreat() {
            return false;
        }
        self.revalidate();
        self.emit(SessionEvent::StepChanged {
            step: self.wizard.current(),
        });
        true
    }

    /// Go back to an earlier step. Forward jumps are ignored; jumping to
    /// the current step succeeds without an event.
    pub fn jump_to(&mut self, step: usize) -> bool {
        let from = self.wizard.current();
        if !self.wizard.jump_to(step) {
            return false;
        }
        if step == from {
            return true;
        }
        self.revalidate();
        self.emit(SessionEvent::StepChanged { step });
        true
    }

    // ─── Submission ─────────────────────────────────────────────────────────

    /// Validate the whole record and save it, wherever the wizard is.
    pub async fn submit<S: RecordStore>(
        &mut self,
        reconciler: &Reconciler<S>,
    ) -> Result<String, FormError> {
        if self.saving {
            return Err(FormError::SubmitInFlight);
        }
        match schema::validate(&self.record, self.schema) {
            Ok(validated) => self.persist(reconciler, validated).await,
            Err(errors) => Err(self.block(errors)),
        }
    }

    /// Mark a save as in flight. Refused while another one is pending.
    pub fn begin_submit(&mut self) -> Result<(), FormError> {
        if self.saving {
            return Err(FormError::SubmitInFlight);
        }
        self.saving = true;
        Ok(())
    }

    /// Settle the pending save. On success the record adopts the id.
    pub fn finish_submit(&mut self, result: Result<String, FormError>) -> Result<String, FormError> {
        self.saving = false;
        match result {
            Ok(id) => {
                self.record.id = Some(id.clone());
                self.post_notice(NoticeKind::Saved, "Record saved");
                self.emit(SessionEvent::Saved { id: id.clone() });
                Ok(id)
            }
            Err(err) => {
                tracing::warn!(error = %err, "Save failed");
                self.post_notice(NoticeKind::SaveFailed, err.to_string());
                Err(err)
            }
        }
    }

    async fn persist<S: RecordStore>(
        &mut self,
        reconciler: &Reconciler<S>,
        validated: ValidatedRecord,
    ) -> Result<String, FormError> {
        self.begin_submit()?;
        let pending = PendingSave(&mut self.saving);
        let result = reconciler.save(&validated).await;
        drop(pending);
        self.finish_submit(result)
    }

    // ─── Loading ────────────────────────────────────────────────────────────

    /// Swap in a whole record: first step, no errors, pending lookups
    /// discarded.
    pub fn replace_record(&mut self, record: Record) {
        self.record = record;
        self.wizard.reset();
        self.errors = ValidationErrors::default();
        self.touched.clear();
        self.lookups.invalidate();
        let id = self.record.id.clone();
        self.emit(SessionEvent::Loaded { id });
    }

    /// Load a stored record by id. On failure the current record stays.
    pub async fn open<S: RecordStore>(
        &mut self,
        reconciler: &Reconciler<S>,
        id: &str,
    ) -> Result<(), FormError> {
        match reconciler.load(id).await {
            Ok(record) => {
                self.replace_record(record);
                Ok(())
            }
            Err(err) => {
                let kind = match err {
                    FormError::NotFound(_) => NoticeKind::RecordNotFound,
                    _ => NoticeKind::LoadFailed,
                };
                self.post_notice(kind, err.to_string());
                Err(err)
            }
        }
    }

    /// Load the signed-in user's profile, or start a blank one for them.
    pub async fn open_profile<S: RecordStore>(
        &mut self,
        reconciler: &Reconciler<S>,
        owner: Option<&str>,
    ) -> Result<ProfileOpened, FormError> {
        let owner = owner.ok_or(FormError::Unauthenticated)?;

        let existing = match reconciler.load_for_owner(owner).await {
            Ok(existing) => existing,
            Err(err) => {
                self.post_notice(NoticeKind::LoadFailed, err.to_string());
                return Err(err);
            }
        };

        match existing {
            Some(record) => {
                self.replace_record(record);
                Ok(ProfileOpened::Existing)
            }
            None => {
                let mut blank = self.schema.blank_record();
                blank.owner = Some(owner.to_string());
                self.replace_record(blank);
                self.post_notice(
                    NoticeKind::ProfileMissing,
                    "No profile yet. Fill in the form to create one.",
                );
                Ok(ProfileOpened::Blank)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;
    use std::sync::Mutex;

    use serde_json::{Map, Value};

    use crate::db::{DatabaseError, StoredRecord};
    use crate::models::EntityKind;
    use crate::schema::{PATIENT_SCHEMA, PROFILE_SCHEMA};

    // ─── Doubles ────────────────────────────────────────────────────────────

    #[derive(Debug, Clone, PartialEq)]
    enum Write {
        Insert,
        Update(String),
    }

    /// In-memory store that hands out `p-1`, `p-2`, ...
    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<HashMap<String, StoredRecord>>,
        writes: Mutex<Vec<Write>>,
        fail_writes: bool,
        insert_delay: Option<Duration>,
    }

    impl MemoryStore {
        fn failing() -> Self {
            Self {
                fail_writes: true,
                ..Self::default()
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                insert_delay: Some(delay),
                ..Self::default()
            }
        }

        fn writes(&self) -> Vec<Write> {
            self.writes.lock().unwrap().clone()
        }

        fn row(&self, id: &str) -> Option<StoredRecord> {
            self.rows.lock().unwrap().get(id).cloned()
        }
    }

    impl RecordStore for MemoryStore {
        async fn list(&self, entity: EntityKind) -> Result<Vec<StoredRecord>, DatabaseError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.entity == entity)
                .cloned()
                .collect())
        }

        async fn fetch(
            &self,
            entity: EntityKind,
            id: &str,
        ) -> Result<Option<StoredRecord>, DatabaseError> {
            Ok(self.row(id).filter(|r| r.entity == entity))
        }

        async fn find_by_owner(
            &self,
            entity: EntityKind,
            owner: &str,
        ) -> Result<Option<StoredRecord>, DatabaseError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .values()
                .find(|r| r.entity == entity && r.owner.as_deref() == Some(owner))
                .cloned())
        }

        async fn insert(
            &self,
            entity: EntityKind,
            owner: Option<&str>,
            data: &Map<String, Value>,
        ) -> Result<String, DatabaseError> {
            if let Some(delay) = self.insert_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_writes {
                return Err(DatabaseError::ConstraintViolation("store rejected insert".into()));
            }
            let mut rows = self.rows.lock().unwrap();
            let id = format!("p-{}", rows.len() + 1);
            rows.insert(
                id.clone(),
                StoredRecord {
                    id: id.clone(),
                    entity,
                    owner: owner.map(String::from),
                    data: data.clone(),
                    created_at: Default::default(),
                    updated_at: Default::default(),
                },
            );
            self.writes.lock().unwrap().push(Write::Insert);
            Ok(id)
        }

        async fn update(
            &self,
            entity: EntityKind,
            id: &str,
            data: &Map<String, Value>,
        ) -> Result<(), DatabaseError> {
            let mut rows = self.rows.lock().unwrap();
            let row = rows
                .get_mut(id)
                .filter(|r| r.entity == entity)
                .ok_or_else(|| DatabaseError::NotFound {
                    entity_type: entity.as_str().into(),
                    id: id.into(),
                })?;
            row.data = data.clone();
            self.writes.lock().unwrap().push(Write::Update(id.into()));
            Ok(())
        }
    }

    /// Address service with two known answers.
    struct FixedLookup;

    impl AddressLookup for FixedLookup {
        async fn lookup(&self, postal_code: &str) -> Result<LookupResult, LookupError> {
            match postal_code {
                "01310930" => Ok(paulista()),
                _ => Err(LookupError::NotFound(postal_code.into())),
            }
        }
    }

    struct DownLookup;

    impl AddressLookup for DownLookup {
        async fn lookup(&self, _postal_code: &str) -> Result<LookupResult, LookupError> {
            Err(LookupError::Connection("http://viacep.invalid".into()))
        }
    }

    fn paulista() -> LookupResult {
        LookupResult {
            postal_code: "01310930".into(),
            street: "Av. Paulista".into(),
            neighborhood: "Bela Vista".into(),
            city: "São Paulo".into(),
            region: "SP".into(),
        }
    }

    fn record_events(session: &mut FormSession) -> Rc<RefCell<Vec<SessionEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        session.subscribe(move |event| sink.borrow_mut().push(event.clone()));
        events
    }

    const WAIT: Duration = Duration::from_secs(1);

    fn fill_personal(session: &mut FormSession) {
        session.set_input("pac_name", "  Ana Souza ").unwrap();
        session.set_input("pac_sex", "feminino").unwrap();
        session.set_input("pac_birth_date", "15/01/1990").unwrap();
        session.set_input("pac_whatsapp", "(11) 98765-4321").unwrap();
        session.set_input("pac_cpf", "529.982.247-25").unwrap();
    }

    fn fill_address(session: &mut FormSession) {
        session.set_input("pac_addrs_zip", "01310-930").unwrap();
        session.set_input("pac_addrs_street_name", "Av. Paulista").unwrap();
        session.set_input("pac_addrs_num", "1578").unwrap();
        session.set_input("pac_addrs_city", "São Paulo").unwrap();
        session.set_input("pac_addrs_uf", "SP").unwrap();
        session.set_flag("pac_addrs_has_comp", true).unwrap();
    }

    // ─── Input and rules ────────────────────────────────────────────────────

    #[test]
    fn input_is_normalized_and_masked_for_display() {
        let mut session = FormSession::new(&PATIENT_SCHEMA);
        fill_personal(&mut session);
        let record = session.record();
        assert_eq!(record.text("pac_name"), "Ana Souza");
        assert_eq!(record.text("pac_sex"), "Feminino");
        assert_eq!(record.text("pac_birth_date"), "1990-01-15");
        assert_eq!(record.text("pac_cpf"), "52998224725");
        assert_eq!(session.display_value("pac_cpf"), "529.982.247-25");
        assert_eq!(session.display_value("pac_birth_date"), "15/01/1990");
        assert_eq!(session.display_value("nope"), "");
    }

    #[test]
    fn unknown_field_and_non_flag_are_rejected() {
        let mut session = FormSession::new(&PATIENT_SCHEMA);
        assert!(matches!(
            session.set_input("pac_nickname", "Aninha"),
            Err(FormError::UnknownField(_))
        ));
        assert!(matches!(
            session.set_flag("pac_name", true),
            Err(FormError::NotAFlag(_))
        ));
    }

    #[test]
    fn only_touched_fields_show_live_errors() {
        let mut session = FormSession::new(&PATIENT_SCHEMA);
        assert!(session.errors().is_empty());
        session.set_input("pac_cpf", "123").unwrap();
        assert_eq!(session.errors().get("pac_cpf"), Some("Invalid CPF"));
        assert!(!session.errors().contains("pac_name"));
        session.set_input("pac_cpf", "52998224725").unwrap();
        assert!(session.errors().is_empty());
    }

    #[test]
    fn guardian_toggle_clears_and_unrequires_fields() {
        let mut session = FormSession::new(&PATIENT_SCHEMA);
        let events = record_events(&mut session);
        assert!(session.required_fields().contains("pac_resp_name"));

        session.set_input("pac_resp_name", "Maria Souza").unwrap();
        session.set_input("pac_resp_email", "maria@example.com").unwrap();
        let cleared = session.set_flag("pac_has_resp", false).unwrap();

        assert_eq!(cleared.len(), 5);
        assert_eq!(session.record().text("pac_resp_name"), "");
        assert_eq!(session.record().text("pac_resp_email"), "");
        assert!(!session.required_fields().contains("pac_resp_name"));

        // Turning it back on restores nothing.
        assert!(session.set_flag("pac_has_resp", true).unwrap().is_empty());
        assert_eq!(session.record().text("pac_resp_name"), "");

        let flag_events: Vec<SessionEvent> = events
            .borrow()
            .iter()
            .filter(|e| matches!(e, SessionEvent::FlagChanged { .. }))
            .cloned()
            .collect();
        assert_eq!(flag_events.len(), 2);
        assert!(matches!(
            &flag_events[0],
            SessionEvent::FlagChanged { value: false, cleared, .. } if cleared.len() == 5
        ));
    }

    #[test]
    fn flag_text_input_routes_through_rules() {
        let mut session = FormSession::new(&PATIENT_SCHEMA);
        session.set_input("pac_resp_name", "Maria Souza").unwrap();
        session.set_input("pac_has_resp", "false").unwrap();
        assert!(!session.record().flag("pac_has_resp"));
        assert_eq!(session.record().text("pac_resp_name"), "");
    }

    #[test]
    fn age_from_birth_date() {
        let mut session = FormSession::new(&PATIENT_SCHEMA);
        let today = NaiveDate::from_ymd_opt(2024, 1, 14).unwrap();
        assert_eq!(session.age_on(today), None);
        session.set_input("pac_birth_date", "1990-01-15").unwrap();
        assert_eq!(session.age_on(today), Some(33));
    }

    // ─── Enrichment ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn lookup_merges_address() {
        let mut session = FormSession::new(&PATIENT_SCHEMA);
        session.set_input("pac_addrs_city", "Campinas").unwrap();
        session.set_input("pac_addrs_zip", "01310930").unwrap();

        let applied = session.lookup_address(&FixedLookup, WAIT).await;

        assert!(matches!(applied, LookupApplied::Merged { .. }));
        let record = session.record();
        assert_eq!(record.text("pac_addrs_street_name"), "Av. Paulista");
        assert_eq!(record.text("pac_addrs_city"), "São Paulo");
        assert_eq!(record.text("pac_addrs_uf"), "SP");
        assert_eq!(record.text("pac_addrs_bairro"), "Bela Vista");
    }

    #[tokio::test]
    async fn unknown_postal_code_leaves_fields_and_posts_notice() {
        let mut session = FormSession::new(&PATIENT_SCHEMA);
        session.set_input("pac_addrs_street_name", "Rua A").unwrap();
        session.set_input("pac_addrs_city", "Campinas").unwrap();
        session.set_input("pac_addrs_uf", "SP").unwrap();
        session.set_input("pac_addrs_zip", "00000000").unwrap();
        let before = session.record().clone();

        let applied = session.lookup_address(&FixedLookup, WAIT).await;

        assert_eq!(applied, LookupApplied::NotFound);
        assert_eq!(session.record(), &before);
        assert_eq!(session.notices().len(), 1);
        assert_eq!(session.notices()[0].kind, NoticeKind::AddressNotFound);
        // Still editable; the next completion looks up again.
        session.set_input("pac_addrs_zip", "01310930").unwrap();
        assert!(matches!(
            session.lookup_address(&FixedLookup, WAIT).await,
            LookupApplied::Merged { .. }
        ));
    }

    #[tokio::test]
    async fn network_failure_is_a_notice_not_an_error() {
        let mut session = FormSession::new(&PATIENT_SCHEMA);
        session.set_input("pac_addrs_zip", "01310930").unwrap();
        assert_eq!(
            session.lookup_address(&DownLookup, WAIT).await,
            LookupApplied::Failed
        );
        assert_eq!(session.record().text("pac_addrs_street_name"), "");
        assert_eq!(session.take_notices()[0].kind, NoticeKind::LookupFailed);
        assert!(session.notices().is_empty());
    }

    #[test]
    fn incomplete_postal_code_takes_no_ticket() {
        let mut session = FormSession::new(&PATIENT_SCHEMA);
        session.set_input("pac_addrs_zip", "0131").unwrap();
        assert_eq!(session.begin_lookup(), None);
    }

    #[test]
    fn stale_lookup_result_is_discarded() {
        let mut session = FormSession::new(&PATIENT_SCHEMA);
        session.set_input("pac_addrs_zip", "01310930").unwrap();
        let first = session.begin_lookup().unwrap();
        let second = session.begin_lookup().unwrap();

        let newer = LookupResult {
            street: "Rua Nova".into(),
            ..paulista()
        };
        assert!(matches!(
            session.apply_lookup(&second, Ok(newer)),
            LookupApplied::Merged { .. }
        ));
        // The older call resolves last and must not win.
        assert_eq!(session.apply_lookup(&first, Ok(paulista())), LookupApplied::Stale);
        assert_eq!(session.record().text("pac_addrs_street_name"), "Rua Nova");
    }

    #[test]
    fn editing_postal_code_outdates_in_flight_lookup() {
        let mut session = FormSession::new(&PATIENT_SCHEMA);
        session.set_input("pac_addrs_zip", "01310930").unwrap();
        let ticket = session.begin_lookup().unwrap();
        session.set_input("pac_addrs_zip", "2004002").unwrap();
        assert_eq!(session.apply_lookup(&ticket, Ok(paulista())), LookupApplied::Stale);
        assert_eq!(session.record().text("pac_addrs_street_name"), "");
    }

    // ─── Wizard and persistence ─────────────────────────────────────────────

    #[tokio::test]
    async fn advance_is_gated_by_current_step() {
        let reconciler = Reconciler::new(MemoryStore::default(), &PATIENT_SCHEMA);
        let mut session = FormSession::new(&PATIENT_SCHEMA);

        let err = session.advance(&reconciler).await.unwrap_err();
        match err {
            FormError::Validation(errors) => {
                assert!(errors.contains("pac_name"));
                assert!(!errors.contains("pac_addrs_zip"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(session.current_step(), 0);
        assert!(session.errors().contains("pac_name"));

        fill_personal(&mut session);
        assert_eq!(
            session.advance(&reconciler).await.unwrap(),
            AdvanceOutcome::Moved { to: 1 }
        );
        assert!(session.errors().is_empty());
    }

    #[tokio::test]
    async fn retreat_never_validates() {
        let reconciler = Reconciler::new(MemoryStore::default(), &PATIENT_SCHEMA);
        let mut session = FormSession::new(&PATIENT_SCHEMA);
        fill_personal(&mut session);
        session.advance(&reconciler).await.unwrap();

        session.set_input("pac_name", "").unwrap();
        assert!(session.retreat());
        assert_eq!(session.current_step(), 0);
        assert!(!session.retreat());
        assert_eq!(session.current_step(), 0);
    }

    #[tokio::test]
    async fn jumps_agree_with_wizard() {
        let reconciler = Reconciler::new(MemoryStore::default(), &PATIENT_SCHEMA);
        let mut session = FormSession::new(&PATIENT_SCHEMA);
        let events = record_events(&mut session);
        fill_personal(&mut session);
        session.advance(&reconciler).await.unwrap();
        events.borrow_mut().clear();

        assert!(session.jump_to(1));
        assert!(events.borrow().is_empty());
        assert!(!session.jump_to(2));
        assert!(session.jump_to(0));
        assert_eq!(session.current_step(), 0);
        assert_eq!(*events.borrow(), [SessionEvent::StepChanged { step: 0 }]);
    }

    #[tokio::test]
    async fn full_flow_inserts_then_updates_same_id() {
        let reconciler = Reconciler::new(MemoryStore::default(), &PATIENT_SCHEMA);
        let mut session = FormSession::new(&PATIENT_SCHEMA);
        let events = record_events(&mut session);

        fill_personal(&mut session);
        session.advance(&reconciler).await.unwrap();
        fill_address(&mut session);
        session.advance(&reconciler).await.unwrap();
        session.set_flag("pac_has_resp", false).unwrap();

        let outcome = session.advance(&reconciler).await.unwrap();
        assert_eq!(outcome, AdvanceOutcome::Saved { id: "p-1".into() });
        assert_eq!(session.record().id.as_deref(), Some("p-1"));
        assert_eq!(session.current_step(), 2);
        assert!(events
            .borrow()
            .contains(&SessionEvent::Saved { id: "p-1".into() }));

        session.set_input("pac_addrs_num", "1600").unwrap();
        assert_eq!(session.submit(&reconciler).await.unwrap(), "p-1");

        let store = reconciler.store();
        assert_eq!(store.writes(), [Write::Insert, Write::Update("p-1".into())]);
        let row = store.row("p-1").unwrap();
        assert_eq!(row.data["pac_addrs_num"], Value::from("1600"));
    }

    #[tokio::test]
    async fn loaded_record_submits_as_update() {
        let reconciler = Reconciler::new(MemoryStore::default(), &PATIENT_SCHEMA);
        let mut writer = FormSession::new(&PATIENT_SCHEMA);
        fill_personal(&mut writer);
        fill_address(&mut writer);
        writer.set_flag("pac_has_resp", false).unwrap();
        writer.submit(&reconciler).await.unwrap();

        let mut session = FormSession::new(&PATIENT_SCHEMA);
        session.open(&reconciler, "p-1").await.unwrap();
        assert_eq!(session.record().id.as_deref(), Some("p-1"));
        assert_eq!(session.record().text("pac_name"), "Ana Souza");

        session.set_input("pac_email", "ana@example.com").unwrap();
        assert_eq!(session.submit(&reconciler).await.unwrap(), "p-1");
        assert_eq!(
            reconciler.store().writes(),
            [Write::Insert, Write::Update("p-1".into())]
        );
    }

    #[tokio::test]
    async fn failed_save_keeps_step_and_allows_retry() {
        let reconciler = Reconciler::new(MemoryStore::failing(), &PATIENT_SCHEMA);
        let mut session = FormSession::new(&PATIENT_SCHEMA);
        fill_personal(&mut session);
        session.advance(&reconciler).await.unwrap();
        fill_address(&mut session);
        session.advance(&reconciler).await.unwrap();
        session.set_flag("pac_has_resp", false).unwrap();

        let err = session.advance(&reconciler).await.unwrap_err();
        assert!(matches!(err, FormError::Persistence(_)));
        assert_eq!(session.current_step(), 2);
        assert!(!session.is_saving());
        assert_eq!(session.record().id, None);
        assert_eq!(session.notices().last().map(|n| n.kind), Some(NoticeKind::SaveFailed));
    }

    #[tokio::test]
    async fn duplicate_submit_is_refused() {
        let reconciler = Reconciler::new(MemoryStore::default(), &PATIENT_SCHEMA);
        let mut session = FormSession::new(&PATIENT_SCHEMA);
        fill_personal(&mut session);
        fill_address(&mut session);
        session.set_flag("pac_has_resp", false).unwrap();

        session.begin_submit().unwrap();
        assert!(session.is_saving());
        assert!(matches!(session.begin_submit(), Err(FormError::SubmitInFlight)));
        assert!(matches!(
            session.submit(&reconciler).await,
            Err(FormError::SubmitInFlight)
        ));
        assert!(reconciler.store().writes().is_empty());

        assert_eq!(session.finish_submit(Ok("p-7".into())).unwrap(), "p-7");
        assert_eq!(session.record().id.as_deref(), Some("p-7"));
        assert!(session.begin_submit().is_ok());
    }

    #[tokio::test]
    async fn abandoned_save_does_not_block_the_next_one() {
        let slow = Reconciler::new(MemoryStore::slow(Duration::from_secs(60)), &PATIENT_SCHEMA);
        let reconciler = Reconciler::new(MemoryStore::default(), &PATIENT_SCHEMA);
        let mut session = FormSession::new(&PATIENT_SCHEMA);
        fill_personal(&mut session);
        fill_address(&mut session);
        session.set_flag("pac_has_resp", false).unwrap();

        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), session.submit(&slow)).await;
        assert!(abandoned.is_err());
        assert!(!session.is_saving());
        assert_eq!(session.record().id, None);

        assert_eq!(session.submit(&reconciler).await.unwrap(), "p-1");
        assert_eq!(reconciler.store().writes(), [Write::Insert]);
    }

    #[tokio::test]
    async fn submit_reports_errors_from_every_step() {
        let reconciler = Reconciler::new(MemoryStore::default(), &PATIENT_SCHEMA);
        let mut session = FormSession::new(&PATIENT_SCHEMA);
        fill_personal(&mut session);
        let err = session.submit(&reconciler).await.unwrap_err();
        assert!(matches!(err, FormError::Validation(_)));
        assert!(session.errors().contains("pac_addrs_zip"));
        assert!(session.errors().contains("pac_resp_name"));
        assert!(reconciler.store().writes().is_empty());
    }

    #[tokio::test]
    async fn open_missing_record_keeps_current_state() {
        let reconciler = Reconciler::new(MemoryStore::default(), &PATIENT_SCHEMA);
        let mut session = FormSession::new(&PATIENT_SCHEMA);
        session.set_input("pac_name", "Ana Souza").unwrap();

        let err = session.open(&reconciler, "p-404").await.unwrap_err();
        assert!(matches!(err, FormError::NotFound(_)));
        assert_eq!(session.record().text("pac_name"), "Ana Souza");
        assert_eq!(session.notices()[0].kind, NoticeKind::RecordNotFound);
    }

    #[tokio::test]
    async fn replace_record_resets_wizard_and_lookups() {
        let reconciler = Reconciler::new(MemoryStore::default(), &PATIENT_SCHEMA);
        let mut session = FormSession::new(&PATIENT_SCHEMA);
        fill_personal(&mut session);
        session.advance(&reconciler).await.unwrap();
        session.set_input("pac_addrs_zip", "01310930").unwrap();
        let ticket = session.begin_lookup().unwrap();

        session.replace_record(PATIENT_SCHEMA.blank_record());

        assert_eq!(session.current_step(), 0);
        assert!(session.errors().is_empty());
        assert_eq!(session.apply_lookup(&ticket, Ok(paulista())), LookupApplied::Stale);
        assert_eq!(session.record().text("pac_addrs_street_name"), "");
    }

    // ─── Profile flow ───────────────────────────────────────────────────────

    #[test]
    fn profile_form_requires_a_user() {
        assert!(matches!(
            FormSession::for_owner(&PROFILE_SCHEMA, None),
            Err(FormError::Unauthenticated)
        ));
        let session = FormSession::for_owner(&PROFILE_SCHEMA, Some("user-1")).unwrap();
        assert_eq!(session.record().owner.as_deref(), Some("user-1"));
    }

    #[tokio::test]
    async fn missing_profile_starts_blank_for_owner() {
        let reconciler = Reconciler::new(MemoryStore::default(), &PROFILE_SCHEMA);
        let mut session = FormSession::new(&PROFILE_SCHEMA);

        let opened = session.open_profile(&reconciler, Some("user-1")).await.unwrap();

        assert_eq!(opened, ProfileOpened::Blank);
        assert_eq!(session.record().owner.as_deref(), Some("user-1"));
        assert_eq!(session.record().id, None);
        assert_eq!(session.notices()[0].kind, NoticeKind::ProfileMissing);
        assert!(matches!(
            session.open_profile(&reconciler, None).await,
            Err(FormError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn existing_profile_is_loaded_by_owner() {
        let reconciler = Reconciler::new(MemoryStore::default(), &PROFILE_SCHEMA);
        let profile = crate::schema::fixtures::valid_profile("user-1");
        let id = reconciler
            .save(&schema::validate(&profile, &PROFILE_SCHEMA).unwrap())
            .await
            .unwrap();

        let mut session = FormSession::new(&PROFILE_SCHEMA);
        let opened = session.open_profile(&reconciler, Some("user-1")).await.unwrap();

        assert_eq!(opened, ProfileOpened::Existing);
        assert_eq!(session.record().id.as_deref(), Some(id.as_str()));
        assert_eq!(session.record().text("prof_name"), "Carla Mendes");
        assert!(session.notices().is_empty());
    }
}
