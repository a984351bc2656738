use std::sync::atomic::{AtomicBool, Ordering};

use super::domain::{RequestContext, Role};

/// Mutating and privileged operations guarded by the permission gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Register,
    Drop,
    RecordScore,
    SettleGrades,
    ViewRoster,
}

impl Action {
    pub const fn describe(self) -> &'static str {
        match self {
            Action::Register => "register for a section",
            Action::Drop => "drop an enrollment",
            Action::RecordScore => "record a component score",
            Action::SettleGrades => "settle final grades",
            Action::ViewRoster => "view a section roster",
        }
    }
}

/// Role- and maintenance-driven authorization, consulted before any
/// transaction is opened. Implementations must never leak internal state in
/// their denial reasons.
pub trait PermissionGate: Send + Sync {
    fn is_action_allowed(&self, ctx: &RequestContext, action: Action) -> bool;
    fn reason_denied(&self, ctx: &RequestContext, action: Action) -> String;
}

/// Default gate: a static role table plus a global maintenance flag.
///
/// Maintenance mode freezes every guarded action for non-administrators so
/// term rollover and data repair can run without racing live registrations.
#[derive(Debug, Default)]
pub struct RolePermissionGate {
    maintenance: AtomicBool,
}

impl RolePermissionGate {
    pub fn new(maintenance: bool) -> Self {
        Self {
            maintenance: AtomicBool::new(maintenance),
        }
    }

    pub fn set_maintenance(&self, enabled: bool) {
        self.maintenance.store(enabled, Ordering::Release);
    }

    fn in_maintenance(&self) -> bool {
        self.maintenance.load(Ordering::Acquire)
    }

    fn role_allows(role: Role, action: Action) -> bool {
        match action {
            Action::Register | Action::Drop => matches!(role, Role::Student | Role::Admin),
            Action::RecordScore | Action::SettleGrades | Action::ViewRoster => {
                matches!(role, Role::Instructor | Role::Admin)
            }
        }
    }
}

impl PermissionGate for RolePermissionGate {
    fn is_action_allowed(&self, ctx: &RequestContext, action: Action) -> bool {
        if self.in_maintenance() && ctx.role != Role::Admin {
            return false;
        }
        Self::role_allows(ctx.role, action)
    }

    fn reason_denied(&self, ctx: &RequestContext, action: Action) -> String {
        if self.in_maintenance() && ctx.role != Role::Admin {
            return "the registrar is in maintenance mode; please try again later".to_string();
        }
        format!("a {} may not {}", ctx.role.label(), action.describe())
    }
}

#[cfg(test)]
mod test {
    use super::{Action, PermissionGate, RolePermissionGate};
    use crate::registry::domain::RequestContext;
    use chrono::NaiveDate;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 9, 1).expect("valid date")
    }

    #[test]
    fn students_register_instructors_settle() {
        let gate = RolePermissionGate::default();
        let student = RequestContext::student("stu-1", today());
        let instructor = RequestContext::instructor("inst-1", today());

        assert!(gate.is_action_allowed(&student, Action::Register));
        assert!(!gate.is_action_allowed(&student, Action::SettleGrades));
        assert!(gate.is_action_allowed(&instructor, Action::SettleGrades));
        assert!(!gate.is_action_allowed(&instructor, Action::Register));
    }

    #[test]
    fn maintenance_freezes_everyone_but_admins() {
        let gate = RolePermissionGate::new(true);
        let student = RequestContext::student("stu-1", today());
        let admin = RequestContext::admin("adm-1", today());

        assert!(!gate.is_action_allowed(&student, Action::Register));
        assert!(gate
            .reason_denied(&student, Action::Register)
            .contains("maintenance"));
        assert!(gate.is_action_allowed(&admin, Action::Register));

        gate.set_maintenance(false);
        assert!(gate.is_action_allowed(&student, Action::Register));
    }
}
