use clap::{Arg, ArgAction, ArgMatches, Command};
use std::error::Error;
use std::path::{Path, PathBuf};

use coursesync::codec::{ConfigCodec, ConfigKind, YamlCodec};
use coursesync::diff::diff;
use coursesync::logging::*;
use coursesync::plan::Planner;
use coursesync::remote::SnapshotFile;
use coursesync::{Course, Direction, Reconciler, SyncConfig};

///////////////////////
// Utility functions //
///////////////////////

fn read_course(path: &Path) -> Result<Course, Box<dyn Error>> {
	let text = std::fs::read_to_string(path)
		.map_err(|err| format!("Cannot read {}: {}", path.display(), err))?;
	let mut course: Course = serde_json::from_str(&text)
		.map_err(|err| format!("{} is not a course snapshot: {}", path.display(), err))?;
	course.normalize();
	Ok(course)
}

fn write_course(path: &Path, course: &Course) -> Result<(), Box<dyn Error>> {
	let json = serde_json::to_string_pretty(course)?;
	std::fs::write(path, json).map_err(|err| format!("Cannot write {}: {}", path.display(), err))?;
	Ok(())
}

fn path_arg(matches: &ArgMatches, name: &str) -> Result<PathBuf, Box<dyn Error>> {
	matches
		.get_one::<String>(name)
		.map(PathBuf::from)
		.ok_or_else(|| format!("--{} is required", name).into())
}

//////////////
// Commands //
//////////////

fn plan(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
	let local = read_course(&path_arg(matches, "local")?)?;
	let remote = read_course(&path_arg(matches, "remote")?)?;
	let baseline = match matches.get_one::<String>("baseline") {
		Some(path) => Some(read_course(Path::new(path))?),
		None => None,
	};
	let direction = if matches.get_flag("push") { Direction::Push } else { Direction::Pull };

	let changes = diff(&local, baseline.as_ref(), &remote, direction);
	let plan = Planner::new(direction).plan(&changes);
	println!("{}", changes);
	println!("{}", plan);
	Ok(())
}

async fn pull(config: SyncConfig, matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
	let local_path = path_arg(matches, "local")?;
	let mut course = read_course(&local_path)?;

	let mut reconciler = Reconciler::builder()
		.config(config)
		.remote(SnapshotFile::new(path_arg(matches, "remote")?))
		.notifier(|title: &str, message: &str| eprintln!("{}\n{}", title, message))
		.build()?;

	let result = reconciler.pull(&mut course).await;
	// Saved after a partial apply too
	write_course(&local_path, &course)?;
	result?;
	Ok(())
}

fn check_config(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
	let path = path_arg(matches, "file")?;
	let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
	let kind = ConfigKind::from_file_name(name).ok_or_else(|| {
		format!(
			"Unknown config file '{}'. Valid options: course-info.yaml, section-info.yaml, lesson-info.yaml, task-info.yaml",
			name
		)
	})?;
	let text = std::fs::read_to_string(&path)
		.map_err(|err| format!("Cannot read {}: {}", path.display(), err))?;
	YamlCodec
		.deserialize(&text, kind)
		.map_err(|err| err.in_file(&path.display().to_string()))?;
	println!("{}: OK", path.display());
	Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	let matches = Command::new("coursesync")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Three-way course synchronization")
		.subcommand_required(true)
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.value_name("FILE")
				.global(true)
				.help("Config file (.toml, .json or .json5)"),
		)
		.arg(
			Arg::new("profile")
				.short('p')
				.long("profile")
				.value_name("PROFILE")
				.global(true)
				.help("Profile"),
		)
		.subcommand(
			Command::new("plan")
				.about("Print the changes and actions of a sync without applying them")
				.arg(Arg::new("local").long("local").value_name("JSON").required(true))
				.arg(Arg::new("remote").long("remote").value_name("JSON").required(true))
				.arg(Arg::new("baseline").long("baseline").value_name("JSON"))
				.arg(
					Arg::new("push")
						.long("push")
						.action(ArgAction::SetTrue)
						.help("Plan an upload"),
				),
		)
		.subcommand(
			Command::new("pull")
				.about("Adopt a server snapshot into a local course")
				.arg(Arg::new("root").long("root").value_name("DIR").help("Course directory"))
				.arg(Arg::new("local").long("local").value_name("JSON").required(true))
				.arg(Arg::new("remote").long("remote").value_name("JSON").required(true))
				.arg(Arg::new("state-dir").long("state-dir").value_name("DIR")),
		)
		.subcommand(
			Command::new("check-config")
				.about("Validate a YAML config file of the course layout")
				.arg(Arg::new("file").required(true)),
		)
		.get_matches();

	let mut config = SyncConfig::load(matches.get_one::<String>("config").map(Path::new))?;
	if let Some(profile) = matches.get_one::<String>("profile") {
		config.profile = profile.clone();
	}
	coursesync::logging::init_tracing_with(&config.log_level);

	if let Some(sub_matches) = matches.subcommand_matches("plan") {
		plan(sub_matches)?;
	} else if let Some(sub_matches) = matches.subcommand_matches("pull") {
		if let Some(root) = sub_matches.get_one::<String>("root") {
			config.course_root = PathBuf::from(root);
		}
		if let Some(dir) = sub_matches.get_one::<String>("state-dir") {
			config.state_dir = PathBuf::from(dir);
		}
		pull(config, sub_matches).await?;
	} else if let Some(sub_matches) = matches.subcommand_matches("check-config") {
		if let Err(err) = check_config(sub_matches) {
			error!("{}", err);
			return Err(err);
		}
	}

	Ok(())
}

// vim: ts=4
