//! Known-good records shared by tests across the crate.

use crate::models::Record;
use crate::schema::{PATIENT_SCHEMA, PROFILE_SCHEMA};

/// Every base-required patient field filled, no guardian, no complement.
pub(crate) fn valid_patient() -> Record {
    let mut r = PATIENT_SCHEMA.blank_record();
    r.set("pac_name", "Ana Souza");
    r.set("pac_sex", "Feminino");
    r.set("pac_birth_date", "1990-01-15");
    r.set("pac_whatsapp", "11987654321");
    r.set("pac_cpf", "52998224725");
    r.set("pac_addrs_zip", "01310930");
    r.set("pac_addrs_street_name", "Av. Paulista");
    r.set("pac_addrs_num", "1578");
    r.set("pac_addrs_city", "São Paulo");
    r.set("pac_addrs_uf", "SP");
    r.set("pac_addrs_has_comp", true);
    r.set("pac_has_resp", false);
    r
}

pub(crate) fn valid_profile(owner: &str) -> Record {
    let mut r = PROFILE_SCHEMA.blank_record();
    r.owner = Some(owner.to_string());
    r.set("prof_name", "Carla Mendes");
    r.set("prof_sex", "Feminino");
    r.set("prof_birth_date", "1985-03-02");
    r.set("prof_cpf", "52998224725");
    r.set("prof_addrs_zip", "01310930");
    r.set("prof_addrs_street_name", "Av. Paulista");
    r.set("prof_addrs_num", "900");
    r.set("prof_addrs_city", "São Paulo");
    r.set("prof_addrs_uf", "SP");
    r.set("prof_addrs_has_comp", false);
    r.set("prof_addrs_comp", "Sala 12");
    r.set("prof_occupation", "Psicóloga");
    r.set("prof_council_id", "CRP 06/12345");
    r.set("prof_whatsapp", "11912345678");
    r.set("prof_email", "carla@example.com");
    r
}
