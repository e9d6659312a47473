//! Patient intake form.

use super::{
    birth_date_in_past, is_state_code, AddressFields, Constraint, FieldSpec, FormSchema,
    Refinement, ValidationErrors,
};
use crate::models::{EntityKind, FieldKind, Record, Sex};
use crate::rules::FlagGroup;

pub const STEP_PERSONAL: &str = "personal";
pub const STEP_ADDRESS: &str = "address";
pub const STEP_GUARDIAN: &str = "guardian";

static FIELDS: [FieldSpec; 20] = [
    // ── personal ──
    FieldSpec {
        name: "pac_name",
        label: "Patient name",
        kind: FieldKind::Text,
        step: STEP_PERSONAL,
        required: true,
        missing: "Name is required",
        constraints: &[Constraint::MinLen { len: 3, message: "Name is required" }],
    },
    FieldSpec {
        name: "pac_sex",
        label: "Sex",
        kind: FieldKind::Enumeration(Sex::ALL),
        step: STEP_PERSONAL,
        required: true,
        missing: "Sex is required",
        constraints: &[Constraint::OneOf { message: "Sex is required" }],
    },
    FieldSpec {
        name: "pac_birth_date",
        label: "Birth date",
        kind: FieldKind::Date,
        step: STEP_PERSONAL,
        required: true,
        missing: "Invalid birth date",
        constraints: &[Constraint::Date { message: "Invalid birth date" }],
    },
    FieldSpec {
        name: "pac_whatsapp",
        label: "Phone",
        kind: FieldKind::Phone,
        step: STEP_PERSONAL,
        required: true,
        missing: "Phone is required",
        constraints: &[Constraint::MinLen { len: 10, message: "Invalid phone number" }],
    },
    FieldSpec {
        name: "pac_email",
        label: "Email",
        kind: FieldKind::Email,
        step: STEP_PERSONAL,
        required: false,
        missing: "Invalid email",
        constraints: &[Constraint::Email { message: "Invalid email" }],
    },
    FieldSpec {
        name: "pac_cpf",
        label: "CPF",
        kind: FieldKind::Cpf,
        step: STEP_PERSONAL,
        required: true,
        missing: "Invalid CPF",
        constraints: &[Constraint::Digits { len: 11, message: "Invalid CPF" }],
    },
    // ── address ──
    FieldSpec {
        name: "pac_addrs_zip",
        label: "CEP",
        kind: FieldKind::PostalCode,
        step: STEP_ADDRESS,
        required: true,
        missing: "Invalid CEP",
        constraints: &[Constraint::Digits { len: 8, message: "Invalid CEP" }],
    },
    FieldSpec {
        name: "pac_addrs_street_name",
        label: "Street",
        kind: FieldKind::Text,
        step: STEP_ADDRESS,
        required: true,
        missing: "Street is required",
        constraints: &[],
    },
    FieldSpec {
        name: "pac_addrs_num",
        label: "Number",
        kind: FieldKind::Text,
        step: STEP_ADDRESS,
        required: true,
        missing: "Number is required",
        constraints: &[],
    },
    FieldSpec {
        name: "pac_addrs_bairro",
        label: "Neighborhood",
        kind: FieldKind::Text,
        step: STEP_ADDRESS,
        required: false,
        missing: "Neighborhood is required",
        constraints: &[],
    },
    FieldSpec {
        name: "pac_addrs_city",
        label: "City",
        kind: FieldKind::Text,
        step: STEP_ADDRESS,
        required: true,
        missing: "City is required",
        constraints: &[],
    },
    FieldSpec {
        name: "pac_addrs_uf",
        label: "State",
        kind: FieldKind::Text,
        step: STEP_ADDRESS,
        required: true,
        missing: "State is required",
        constraints: &[Constraint::Matches { check: is_state_code, message: "Invalid state" }],
    },
    FieldSpec {
        name: "pac_addrs_has_comp",
        label: "Address has no complement",
        kind: FieldKind::Flag,
        step: STEP_ADDRESS,
        required: false,
        missing: "",
        constraints: &[],
    },
    FieldSpec {
        name: "pac_addrs_comp",
        label: "Complement",
        kind: FieldKind::Text,
        step: STEP_ADDRESS,
        required: false,
        missing: "Complement is required",
        constraints: &[],
    },
    // ── guardian ──
    FieldSpec {
        name: "pac_has_resp",
        label: "Patient has a guardian",
        kind: FieldKind::Flag,
        step: STEP_GUARDIAN,
        required: false,
        missing: "",
        constraints: &[],
    },
    FieldSpec {
        name: "pac_resp_name",
        label: "Guardian name",
        kind: FieldKind::Text,
        step: STEP_GUARDIAN,
        required: false,
        missing: "Guardian name is required",
        constraints: &[Constraint::MinLen { len: 3, message: "Guardian name is required" }],
    },
    FieldSpec {
        name: "pac_resp_whatsapp",
        label: "Guardian phone",
        kind: FieldKind::Phone,
        step: STEP_GUARDIAN,
        required: false,
        missing: "Guardian phone is required",
        constraints: &[Constraint::MinLen { len: 10, message: "Invalid phone number" }],
    },
    FieldSpec {
        name: "pac_resp_email",
        label: "Guardian email",
        kind: FieldKind::Email,
        step: STEP_GUARDIAN,
        required: false,
        missing: "Guardian email is required",
        constraints: &[Constraint::Email { message: "Invalid email" }],
    },
    FieldSpec {
        name: "pac_resp_occupation",
        label: "Guardian occupation",
        kind: FieldKind::Text,
        step: STEP_GUARDIAN,
        required: false,
        missing: "Guardian occupation is required",
        constraints: &[],
    },
    FieldSpec {
        name: "pac_resp_education",
        label: "Guardian education",
        kind: FieldKind::Text,
        step: STEP_GUARDIAN,
        required: false,
        missing: "Guardian education is required",
        constraints: &[],
    },
];

static FLAG_GROUPS: [FlagGroup; 2] = [
    FlagGroup {
        flag: "pac_has_resp",
        required_when: true,
        fields: &[
            "pac_resp_name",
            "pac_resp_whatsapp",
            "pac_resp_email",
            "pac_resp_occupation",
            "pac_resp_education",
        ],
    },
    // The stored flag records the "address has no complement" checkbox.
    FlagGroup {
        flag: "pac_addrs_has_comp",
        required_when: false,
        fields: &["pac_addrs_comp"],
    },
];

fn birth_date_not_in_future(record: &Record, errors: &mut ValidationErrors) {
    birth_date_in_past(record, "pac_birth_date", errors);
}

static REFINEMENTS: [Refinement; 1] = [Refinement {
    name: "birth_date_not_in_future",
    check: birth_date_not_in_future,
}];

pub static PATIENT_SCHEMA: FormSchema = FormSchema {
    entity: EntityKind::Patient,
    fields: &FIELDS,
    flag_groups: &FLAG_GROUPS,
    refinements: &REFINEMENTS,
    steps: &[STEP_PERSONAL, STEP_ADDRESS, STEP_GUARDIAN],
    address: AddressFields {
        postal_code: "pac_addrs_zip",
        street: "pac_addrs_street_name",
        neighborhood: "pac_addrs_bairro",
        city: "pac_addrs_city",
        region: "pac_addrs_uf",
    },
    display_field: "pac_name",
    birth_date_field: Some("pac_birth_date"),
    flag_defaults: &[("pac_has_resp", true), ("pac_addrs_has_comp", false)],
};
