#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    if let Err(err) = native::run() {
        eprintln!("instancer_cli error: {err}");
        std::process::exit(1);
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use curve_instancer::command::CommandHistory;
    use curve_instancer::geom::{CurveGeometry, Point3, Polyline3};
    use curve_instancer::instancing::{ParamKind, ParamValue};
    use curve_instancer::scene::{MeshShape, NodeId};
    use curve_instancer::session::Session;
    use std::fs;
    use std::path::{Path, PathBuf};

    const HELIX_SEGMENTS: usize = 64;

    const USAGE: &str = r#"instancer_cli (curve-instancer)

USAGE:
  instancer_cli demo [options]
  instancer_cli run <scene.xml> [options]

OPTIONS (demo):
  --count <n>          Instance count (count mode)
  --spacing <s>        Spacing between instances (switches to distance mode)
  --display <type>     normal | template | reference

OPTIONS (both):
  --out <path>         Write the evaluated scene as XML
  --overwrite          Overwrite an existing output file
  -h, --help           Show this help
"#;

    pub fn run() -> Result<(), String> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let mut args = Args::new(args);

        let Some(command) = args.next() else {
            print_usage();
            return Ok(());
        };

        match command.as_str() {
            "demo" => cmd_demo(&mut args),
            "run" => cmd_run(&mut args),
            "-h" | "--help" | "help" => {
                print_usage();
                Ok(())
            }
            other => Err(format!("unknown command `{other}`\n\n{USAGE}")),
        }
    }

    fn print_usage() {
        println!("{USAGE}");
    }

    #[derive(Debug, Default)]
    struct Output {
        path: Option<PathBuf>,
        overwrite: bool,
    }

    impl Output {
        fn write(&self, session: &Session) -> Result<(), String> {
            let Some(path) = self.path.as_deref() else {
                return Ok(());
            };
            ensure_writable(path, self.overwrite)?;
            let xml = session.save().map_err(|err| err.to_string())?;
            fs::write(path, xml).map_err(|err| format!("failed to write {}: {err}", path.display()))?;
            println!("wrote {}", path.display());
            Ok(())
        }
    }

    fn cmd_demo(args: &mut Args) -> Result<(), String> {
        let mut edits: Vec<(ParamKind, ParamValue)> = Vec::new();
        let mut output = Output::default();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--count" => edits.push((
                    ParamKind::InstanceCount,
                    ParamValue::Text(args.value("--count")?),
                )),
                "--spacing" => {
                    edits.push((ParamKind::InstancingMode, ParamValue::Text("distance".into())));
                    edits.push((
                        ParamKind::InstanceSpacing,
                        ParamValue::Text(args.value("--spacing")?),
                    ));
                }
                "--display" => edits.push((
                    ParamKind::DisplayType,
                    ParamValue::Text(args.value("--display")?),
                )),
                "--out" => output.path = Some(PathBuf::from(args.value("--out")?)),
                "--overwrite" => output.overwrite = true,
                "-h" | "--help" => {
                    print_usage();
                    return Ok(());
                }
                other => return Err(format!("unknown option `{other}`\n\n{USAGE}")),
            }
        }

        let mut session = Session::new();
        let curve = session
            .add_curve("helix#", CurveGeometry::Polyline(helix()?))
            .map_err(|err| err.to_string())?;
        let cube = session
            .add_mesh("cube#", MeshShape::unit_cube())
            .map_err(|err| err.to_string())?;
        let mut history = CommandHistory::new();
        let instancer = history
            .execute(&mut session, &[curve, cube])
            .map_err(|err| err.to_string())?;

        for (kind, value) in &edits {
            session
                .set_param(instancer, *kind, value)
                .map_err(|err| format!("{kind}: {err}"))?;
        }

        evaluate_and_print(&mut session)?;
        output.write(&session)
    }

    fn cmd_run(args: &mut Args) -> Result<(), String> {
        let input = PathBuf::from(args.next().ok_or("missing scene path")?);
        let mut output = Output::default();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--out" => output.path = Some(PathBuf::from(args.value("--out")?)),
                "--overwrite" => output.overwrite = true,
                "-h" | "--help" => {
                    print_usage();
                    return Ok(());
                }
                other => return Err(format!("unknown option `{other}`\n\n{USAGE}")),
            }
        }

        let xml = fs::read_to_string(&input)
            .map_err(|err| format!("failed to read {}: {err}", input.display()))?;
        let mut session = Session::load(&xml).map_err(|err| err.to_string())?;
        evaluate_and_print(&mut session)?;
        output.write(&session)
    }

    fn evaluate_and_print(session: &mut Session) -> Result<(), String> {
        let reports = session.evaluate().map_err(|err| err.to_string())?;
        for (id, report) in &reports {
            let name = node_name(session, *id);
            match report.skipped {
                Some(reason) => println!("{name}: skipped ({reason:?})"),
                None => println!(
                    "{name}: {:?}, target {}, +{} -{}, {} placed",
                    report.state,
                    report.target,
                    report.created.len(),
                    report.removed.len(),
                    report.repositioned
                ),
            }
            let instances = session.instances(*id).map_err(|err| err.to_string())?;
            for entry in instances {
                let Some(node) = session.scene().node(entry.instance) else {
                    continue;
                };
                let t = node.transform.translation;
                println!(
                    "  [{}] {:<16} {:>9.4} {:>9.4} {:>9.4}",
                    entry.slot, node.name, t.x, t.y, t.z
                );
            }
        }
        Ok(())
    }

    fn node_name(session: &Session, id: NodeId) -> String {
        session
            .scene()
            .node(id)
            .map_or_else(|| id.to_string(), |node| node.name.clone())
    }

    fn helix() -> Result<Polyline3, String> {
        let points = (0..=HELIX_SEGMENTS)
            .map(|i| {
                let t = i as f64 / HELIX_SEGMENTS as f64;
                let angle = t * std::f64::consts::TAU * 2.0;
                Point3::new(3.0 * angle.cos(), 3.0 * angle.sin(), 6.0 * t)
            })
            .collect();
        Polyline3::new(points)
    }

    fn ensure_writable(path: &Path, overwrite: bool) -> Result<(), String> {
        if path.exists() && !overwrite {
            return Err(format!(
                "{} already exists (pass --overwrite to replace it)",
                path.display()
            ));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|err| format!("failed to create {}: {err}", parent.display()))?;
        }
        Ok(())
    }

    struct Args {
        args: Vec<String>,
        pos: usize,
    }

    impl Args {
        fn new(args: Vec<String>) -> Self {
            Self { args, pos: 0 }
        }

        fn next(&mut self) -> Option<String> {
            let arg = self.args.get(self.pos)?.clone();
            self.pos += 1;
            Some(arg)
        }

        fn value(&mut self, flag: &str) -> Result<String, String> {
            self.next()
                .ok_or_else(|| format!("missing value for {flag}"))
        }
    }
}
