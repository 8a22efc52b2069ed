//! Status and control codes exchanged with the LIS.
//!
//! Callers name a status symbolically (`PASIEN_BARU_MASUK`); the wire carries its two-letter
//! (or one-letter) code (`NI`). The set is closed and the mapping is a static table, so an
//! unknown name is rejected at the request boundary before any data is fetched.

use std::fmt;

/// Every symbolic status known to the bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusControl {
    PasienBaruMasuk,
    PasienPindahRuangan,
    PasienPulang,
    StatusPasienRawatInap,
    StatusPasienRawatJalan,
    MedlegalYa,
    MedlegalTidak,
}

/// Which request field a status may appear in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlKind {
    /// `order_control`
    OrderControl,
    /// `status_pasien` (the wire `ptype`)
    PatientType,
    /// `med_legal`
    MedLegal,
}

const TABLE: [(StatusControl, &str, &str, ControlKind); 7] = [
    (StatusControl::PasienBaruMasuk, "PASIEN_BARU_MASUK", "NI", ControlKind::OrderControl),
    (StatusControl::PasienPindahRuangan, "PASIEN_PINDAH_RUANGAN", "UI", ControlKind::OrderControl),
    (StatusControl::PasienPulang, "PASIEN_PULANG", "PI", ControlKind::OrderControl),
    (StatusControl::StatusPasienRawatInap, "STATUS_PASIEN_RAWAT_INAP", "IP", ControlKind::PatientType),
    (StatusControl::StatusPasienRawatJalan, "STATUS_PASIEN_RAWAT_JALAN", "OP", ControlKind::PatientType),
    (StatusControl::MedlegalYa, "MEDLEGAL_YA", "Y", ControlKind::MedLegal),
    (StatusControl::MedlegalTidak, "MEDLEGAL_TIDAK", "N", ControlKind::MedLegal),
];

impl StatusControl {
    pub const ALL: [StatusControl; 7] = [
        StatusControl::PasienBaruMasuk,
        StatusControl::PasienPindahRuangan,
        StatusControl::PasienPulang,
        StatusControl::StatusPasienRawatInap,
        StatusControl::StatusPasienRawatJalan,
        StatusControl::MedlegalYa,
        StatusControl::MedlegalTidak,
    ];

    fn entry(self) -> &'static (StatusControl, &'static str, &'static str, ControlKind) {
        // TABLE is ordered like the enum declaration.
        &TABLE[self as usize]
    }

    /// Symbolic name accepted from callers.
    pub fn name(self) -> &'static str {
        self.entry().1
    }

    /// Code sent on the wire.
    pub fn code(self) -> &'static str {
        self.entry().2
    }

    pub fn kind(self) -> ControlKind {
        self.entry().3
    }

    /// Resolve a symbolic name. Matching is exact (case-sensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        TABLE
            .iter()
            .find(|(_, n, _, _)| *n == name)
            .map(|(status, _, _, _)| *status)
    }

    /// Resolve a symbolic name, accepting it only for the given field.
    pub fn from_name_of_kind(name: &str, kind: ControlKind) -> Option<Self> {
        Self::from_name(name).filter(|status| status.kind() == kind)
    }

    /// Names valid for a field, in declaration order.
    pub fn names_of(kind: ControlKind) -> Vec<&'static str> {
        TABLE
            .iter()
            .filter(|(_, _, _, k)| *k == kind)
            .map(|(_, name, _, _)| *name)
            .collect()
    }
}

impl fmt::Display for StatusControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_aligned_with_declaration_order() {
        for status in StatusControl::ALL {
            assert_eq!(TABLE[status as usize].0, status);
        }
    }

    #[test]
    fn resolves_every_name_to_its_wire_code() {
        let expected = [
            ("PASIEN_BARU_MASUK", "NI"),
            ("PASIEN_PINDAH_RUANGAN", "UI"),
            ("PASIEN_PULANG", "PI"),
            ("STATUS_PASIEN_RAWAT_INAP", "IP"),
            ("STATUS_PASIEN_RAWAT_JALAN", "OP"),
            ("MEDLEGAL_YA", "Y"),
            ("MEDLEGAL_TIDAK", "N"),
        ];

        for (name, code) in expected {
            let status = StatusControl::from_name(name).expect("known name");
            assert_eq!(status.code(), code);
            assert_eq!(status.name(), name);
        }
    }

    #[test]
    fn rejects_unknown_and_misplaced_names() {
        assert_eq!(StatusControl::from_name("pasien_baru_masuk"), None);
        assert_eq!(StatusControl::from_name("NI"), None);
        assert_eq!(
            StatusControl::from_name_of_kind("STATUS_PASIEN_RAWAT_INAP", ControlKind::OrderControl),
            None
        );
        assert_eq!(
            StatusControl::names_of(ControlKind::PatientType),
            vec!["STATUS_PASIEN_RAWAT_INAP", "STATUS_PASIEN_RAWAT_JALAN"]
        );
    }
}
