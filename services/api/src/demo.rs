use chrono::{Local, NaiveDate};
use clap::Args;
use registrar::error::AppError;
use registrar::registry::{
    ComponentId, Course, CourseId, EnrollmentService, GradeComponent, MemoryStore, RegistrarPolicy,
    RequestContext, RolePermissionGate, Season, Section, SectionId, Term, UserId,
};
use registrar::registry::{NullSink, SettlementEngine};
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Effective date for deadline checks (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) as_of: Option<NaiveDate>,
    /// Skip the grading and settlement portion of the walk-through.
    #[arg(long)]
    pub(crate) skip_settlement: bool,
}

/// Seeds a small fall catalog: an intro course, a follow-up gated on it, and
/// a deliberately tiny seminar for demonstrating seat contention.
pub(crate) fn seed_catalog(store: &MemoryStore, term: Term) {
    let add_deadline = NaiveDate::from_ymd_opt(i32::from(term.year), 9, 8).unwrap_or_default();
    let drop_deadline = NaiveDate::from_ymd_opt(i32::from(term.year), 10, 15).unwrap_or_default();

    store.insert_course(Course {
        id: CourseId("crs-101".to_string()),
        code: "CS101".to_string(),
        title: "Programming Fundamentals".to_string(),
        credits: 3,
        active: true,
        prerequisites: Vec::new(),
    });
    store.insert_course(Course {
        id: CourseId("crs-201".to_string()),
        code: "CS201".to_string(),
        title: "Data Structures".to_string(),
        credits: 3,
        active: true,
        prerequisites: vec![CourseId("crs-101".to_string())],
    });
    store.insert_course(Course {
        id: CourseId("crs-150".to_string()),
        code: "HUM150".to_string(),
        title: "Research Seminar".to_string(),
        credits: 2,
        active: true,
        prerequisites: Vec::new(),
    });

    let section = |id: &str, course: &str, capacity: u32, schedule: &str| Section {
        id: SectionId(id.to_string()),
        course_id: CourseId(course.to_string()),
        instructor_id: UserId("inst-rivera".to_string()),
        term,
        capacity,
        enrolled_count: 0,
        schedule: schedule.to_string(),
        add_deadline,
        drop_deadline,
    };
    store.insert_section(section("sec-101", "crs-101", 30, "Mon/Wed 10:00-11:30"));
    store.insert_section(section("sec-201", "crs-201", 30, "Tue/Thu 14:00-15:30"));
    store.insert_section(section("sec-150", "crs-150", 1, "Mon 11:00-12:00"));

    store.insert_component(GradeComponent {
        id: ComponentId("cmp-mid".to_string()),
        section_id: SectionId("sec-101".to_string()),
        name: "Midterm".to_string(),
        weight: 40.0,
        max_score: 100.0,
    });
    store.insert_component(GradeComponent {
        id: ComponentId("cmp-fin".to_string()),
        section_id: SectionId("sec-101".to_string()),
        name: "Final".to_string(),
        weight: 60.0,
        max_score: 100.0,
    });
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let as_of = args.as_of.unwrap_or_else(|| Local::now().date_naive());

    let store = Arc::new(MemoryStore::new());
    seed_catalog(&store, Term::new(Season::Fall, 2026));

    let sink = Arc::new(NullSink);
    let gate: Arc<RolePermissionGate> = Arc::new(RolePermissionGate::default());
    let policy = RegistrarPolicy::new(Duration::from_secs(5), Term::new(Season::Fall, 2026));
    let service = EnrollmentService::new(store.clone(), sink.clone(), gate.clone(), policy.clone());
    let engine = SettlementEngine::new(store, sink, gate, policy);

    println!("Registration walk-through (effective date {as_of})\n");

    let ada = RequestContext::student("stu-ada", as_of);
    let ben = RequestContext::student("stu-ben", as_of);
    let sec_101 = SectionId("sec-101".to_string());
    let sec_150 = SectionId("sec-150".to_string());
    let sec_201 = SectionId("sec-201".to_string());

    println!("Open sections for stu-ada:");
    match service.available_sections(&ada, &ada.user) {
        Ok(views) => {
            for view in views {
                println!(
                    "  {} {} [{}] {} seats, add by {}",
                    view.course_code,
                    view.course_title,
                    view.schedule,
                    view.seats_remaining,
                    view.add_deadline
                );
            }
        }
        Err(err) => println!("  listing failed: {err}"),
    }

    println!("\nstu-ada registers for CS101:");
    let ada_enrollment = match service.register(&ada, &ada.user, &sec_101) {
        Ok(outcome) => {
            println!(
                "  registered as {} ({} seats left)",
                outcome.enrollment.id, outcome.seats_remaining
            );
            Some(outcome.enrollment.id)
        }
        Err(err) => {
            println!("  failed: {err}");
            None
        }
    };

    println!("\nstu-ada tries CS201 without the prerequisite:");
    report(service.register(&ada, &ada.user, &sec_201));

    println!("\nstu-ada tries the seminar that overlaps the CS101 slot:");
    report(service.register(&ada, &ada.user, &sec_150));

    println!("\nstu-ben takes the seminar's only seat, then stu-ada retries:");
    report(service.register(&ben, &ben.user, &sec_150));
    report(service.register(&ada, &ada.user, &sec_150));

    println!("\nstu-ben joins CS101 and immediately drops it:");
    if let Ok(outcome) = service.register(&ben, &ben.user, &sec_101) {
        println!("  registered as {}", outcome.enrollment.id);
        report(service.drop_enrollment(&ben, &outcome.enrollment.id));
    }

    if args.skip_settlement {
        return Ok(());
    }

    println!("\nThe instructor grades CS101 and settles the section:");
    let instructor = RequestContext::instructor("inst-rivera", as_of);
    if let Some(enrollment_id) = ada_enrollment {
        for (component, score) in [("cmp-mid", 84.0), ("cmp-fin", 91.0)] {
            report(engine.record_score(
                &instructor,
                &sec_101,
                &enrollment_id,
                &ComponentId(component.to_string()),
                score,
            ));
        }
        match engine.compute_final_grades(&instructor, &sec_101) {
            Ok(outcome) => {
                for grade in outcome.settled {
                    println!(
                        "  {}: {:.1} -> {}",
                        grade.student_id, grade.total, grade.letter
                    );
                }
                for student in outcome.skipped {
                    println!("  {student}: skipped, scores incomplete");
                }
            }
            Err(err) => println!("  settlement failed: {err}"),
        }
    }

    Ok(())
}

fn report<T, E: std::fmt::Display>(result: Result<T, E>) {
    match result {
        Ok(_) => println!("  ok"),
        Err(err) => println!("  failed: {err}"),
    }
}
