//! Professional profile form. One profile per signed-in user.

use super::{
    birth_date_in_past, is_state_code, AddressFields, Constraint, FieldSpec, FormSchema,
    Refinement, ValidationErrors,
};
use crate::models::{EntityKind, FieldKind, Record, Sex};
use crate::rules::FlagGroup;

pub const STEP_PERSONAL: &str = "personal";
pub const STEP_LOCATION: &str = "location";
pub const STEP_PROFESSIONAL: &str = "professional";
pub const STEP_CONTACT: &str = "contact";

static FIELDS: [FieldSpec; 17] = [
    FieldSpec {
        name: "prof_name",
        label: "Full name",
        kind: FieldKind::Text,
        step: STEP_PERSONAL,
        required: true,
        missing: "Name is required",
        constraints: &[Constraint::MinLen { len: 3, message: "Name is required" }],
    },
    FieldSpec {
        name: "prof_sex",
        label: "Sex",
        kind: FieldKind::Enumeration(Sex::ALL),
        step: STEP_PERSONAL,
        required: true,
        missing: "Sex is required",
        constraints: &[Constraint::OneOf { message: "Sex is required" }],
    },
    FieldSpec {
        name: "prof_birth_date",
        label: "Birth date",
        kind: FieldKind::Date,
        step: STEP_PERSONAL,
        required: true,
        missing: "Invalid birth date",
        constraints: &[Constraint::Date { message: "Invalid birth date" }],
    },
    FieldSpec {
        name: "prof_cpf",
        label: "CPF",
        kind: FieldKind::Cpf,
        step: STEP_PERSONAL,
        required: true,
        missing: "Invalid CPF",
        constraints: &[Constraint::Digits { len: 11, message: "Invalid CPF" }],
    },
    FieldSpec {
        name: "prof_addrs_zip",
        label: "CEP",
        kind: FieldKind::PostalCode,
        step: STEP_LOCATION,
        required: true,
        missing: "Invalid CEP",
        constraints: &[Constraint::Digits { len: 8, message: "Invalid CEP" }],
    },
    FieldSpec {
        name: "prof_addrs_street_name",
        label: "Street",
        kind: FieldKind::Text,
        step: STEP_LOCATION,
        required: true,
        missing: "Street is required",
        constraints: &[],
    },
    FieldSpec {
        name: "prof_addrs_num",
        label: "Number",
        kind: FieldKind::Text,
        step: STEP_LOCATION,
        required: true,
        missing: "Number is required",
        constraints: &[],
    },
    FieldSpec {
        name: "prof_addrs_bairro",
        label: "Neighborhood",
        kind: FieldKind::Text,
        step: STEP_LOCATION,
        required: false,
        missing: "Neighborhood is required",
        constraints: &[],
    },
    FieldSpec {
        name: "prof_addrs_city",
        label: "City",
        kind: FieldKind::Text,
        step: STEP_LOCATION,
        required: true,
        missing: "City is required",
        constraints: &[],
    },
    FieldSpec {
        name: "prof_addrs_uf",
        label: "State",
        kind: FieldKind::Text,
        step: STEP_LOCATION,
        required: true,
        missing: "State is required",
        constraints: &[Constraint::Matches { check: is_state_code, message: "Invalid state" }],
    },
    FieldSpec {
        name: "prof_addrs_has_comp",
        label: "Address has no complement",
        kind: FieldKind::Flag,
        step: STEP_LOCATION,
        required: false,
        missing: "",
        constraints: &[],
    },
    FieldSpec {
        name: "prof_addrs_comp",
        label: "Complement",
        kind: FieldKind::Text,
        step: STEP_LOCATION,
        required: false,
        missing: "Complement is required",
        constraints: &[],
    },
    FieldSpec {
        name: "prof_occupation",
        label: "Occupation",
        kind: FieldKind::Text,
        step: STEP_PROFESSIONAL,
        required: true,
        missing: "Occupation is required",
        constraints: &[],
    },
    FieldSpec {
        name: "prof_council_id",
        label: "Council registration",
        kind: FieldKind::Text,
        step: STEP_PROFESSIONAL,
        required: true,
        missing: "Council registration is required",
        constraints: &[Constraint::MinLen { len: 4, message: "Invalid council registration" }],
    },
    FieldSpec {
        name: "prof_specialty",
        label: "Specialty",
        kind: FieldKind::Text,
        step: STEP_PROFESSIONAL,
        required: false,
        missing: "Specialty is required",
        constraints: &[],
    },
    FieldSpec {
        name: "prof_whatsapp",
        label: "Phone",
        kind: FieldKind::Phone,
        step: STEP_CONTACT,
        required: true,
        missing: "Phone is required",
        constraints: &[Constraint::MinLen { len: 10, message: "Invalid phone number" }],
    },
    FieldSpec {
        name: "prof_email",
        label: "Email",
        kind: FieldKind::Email,
        step: STEP_CONTACT,
        required: true,
        missing: "Email is required",
        constraints: &[Constraint::Email { message: "Invalid email" }],
    },
];

static FLAG_GROUPS: [FlagGroup; 1] = [FlagGroup {
    flag: "prof_addrs_has_comp",
    required_when: false,
    fields: &["prof_addrs_comp"],
}];

fn birth_date_not_in_future(record: &Record, errors: &mut ValidationErrors) {
    birth_date_in_past(record, "prof_birth_date", errors);
}

static REFINEMENTS: [Refinement; 1] = [Refinement {
    name: "birth_date_not_in_future",
    check: birth_date_not_in_future,
}];

pub static PROFILE_SCHEMA: FormSchema = FormSchema {
    entity: EntityKind::Profile,
    fields: &FIELDS,
    flag_groups: &FLAG_GROUPS,
    refinements: &REFINEMENTS,
    steps: &[STEP_PERSONAL, STEP_LOCATION, STEP_PROFESSIONAL, STEP_CONTACT],
    address: AddressFields {
        postal_code: "prof_addrs_zip",
        street: "prof_addrs_street_name",
        neighborhood: "prof_addrs_bairro",
        city: "prof_addrs_city",
        region: "prof_addrs_uf",
    },
    display_field: "prof_name",
    birth_date_field: Some("prof_birth_date"),
    flag_defaults: &[("prof_addrs_has_comp", false)],
};
